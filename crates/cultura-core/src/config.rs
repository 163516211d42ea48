//! Runtime configuration for the AI layer.
//!
//! Precedence: defaults < TOML file (`CULTURA_CONFIG` path, else `config/cultura.toml`)
//! < environment (`CULTURA_` prefix, `__` between nested keys, e.g.
//! `CULTURA_SESSIONS__MAX_SESSIONS=500`).
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | sessions.max_sessions | 1000 | Admission-control ceiling for live chat sessions. |
//! | sessions.ttl_secs | 1800 | Idle TTL; sessions idle longer are expired on next access. |
//! | sessions.sweep_interval_secs | unset | When set, a background task purges expired sessions. |
//! | rate_limit.refill_interval_ms | 1000 | One token is refilled per interval. |
//! | rate_limit.burst | 5 | Bucket capacity. |
//! | model.timeout_secs | 30 | Upper bound on one upstream call. |
//! | quality.enforce | false | Reject low-quality replies instead of only logging them. |
//! | gateway.bind_addr | 127.0.0.1:8000 | Listen address of the HTTP surface. |
//! | gateway.request_timeout_secs | 45 | Budget for one AI request, including the rate-limit wait. |
//! | facts.<key> | none | Static product text added to every chat context. |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/cultura";
const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub sessions: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub model: ModelConfig,
    pub quality: QualityConfig,
    pub adapters: AdapterLimits,
    pub gateway: GatewayConfig,
    /// Contextual facts seeded into the knowledge store at startup.
    pub facts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub ttl_secs: u64,
    pub sweep_interval_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            ttl_secs: 30 * 60,
            sweep_interval_secs: None,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub refill_interval_ms: u64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_interval_ms: 1000,
            burst: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}

/// Upstream model settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_base: String,
    pub model: String,
    /// Falls back to `OPENROUTER_API_KEY` when unset.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
            timeout_secs: 30,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Priority: config file / `CULTURA_MODEL__API_KEY` > `OPENROUTER_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Replies longer than this many characters fail the gate.
    pub max_chars: usize,
    /// Minimum ratio of distinct words to total words.
    pub min_lexical_diversity: f32,
    /// When false the gate is advisory: failures are logged, not returned.
    pub enforce: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            min_lexical_diversity: 0.3,
            enforce: false,
        }
    }
}

/// Upper bounds on how much each adapter pulls in one `load_data` pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterLimits {
    pub trending_events: usize,
    pub stories_per_event: usize,
    pub threads_per_event: usize,
    pub messages_per_thread: usize,
    pub provinces: usize,
    pub cities_per_province: usize,
    pub locations_per_city: usize,
    pub badges: usize,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            trending_events: 10,
            stories_per_event: 3,
            threads_per_event: 3,
            messages_per_thread: 5,
            provinces: 10,
            cities_per_province: 10,
            locations_per_city: 10,
            badges: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    /// JSON seed catalogue backing the domain sources.
    pub seed_path: Option<String>,
    /// TOML file overriding policy block texts.
    pub policy_path: Option<String>,
    /// Whole-request budget: rate-limit wait plus model call.
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            seed_path: None,
            policy_path: None,
            request_timeout_secs: 45,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl AiConfig {
    /// Load from `CULTURA_CONFIG` (or `config/cultura.toml`) and the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CULTURA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load with an explicit file path (extension optional). A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .set_default("sessions.max_sessions", 1000_i64)?
            .set_default("sessions.ttl_secs", 1800_i64)?
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CULTURA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AiConfig::default();
        assert_eq!(cfg.sessions.max_sessions, 1000);
        assert_eq!(cfg.sessions.ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.model.timeout(), Duration::from_secs(30));
        assert!(!cfg.quality.enforce);
        assert!(cfg.sessions.sweep_interval().is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[sessions]\nmax_sessions = 3\nttl_secs = 1\n\n[quality]\nenforce = true\n\n[rate_limit]\nburst = 1\n\n[facts]\nproduct = \"Cultura is a travel guide.\""
        )
        .unwrap();

        let cfg = AiConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.sessions.max_sessions, 3);
        assert_eq!(cfg.sessions.ttl_secs, 1);
        assert!(cfg.quality.enforce);
        assert_eq!(cfg.rate_limit.burst, 1);
        assert_eq!(cfg.rate_limit.refill_interval_ms, 1000);
        assert_eq!(cfg.facts.get("product").map(String::as_str), Some("Cultura is a travel guide."));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AiConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.adapters.trending_events, 10);
    }
}
