//! Upstream generative model: a system instruction plus a user prompt in,
//! generated text out.
//!
//! [`OpenRouterClient`] speaks the OpenAI-compatible chat completions API.
//! API key: `model.api_key` in config, else `OPENROUTER_API_KEY`.

use crate::config::ModelConfig;
use crate::error::AiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// Request carrying the sampling parameters from `config`.
    pub fn new(config: &ModelConfig, system_instruction: String, prompt: String) -> Self {
        Self {
            system_instruction,
            prompt,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model not configured: {0}")]
    NotConfigured(String),

    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response parse failed: {0}")]
    Malformed(String),

    #[error("model returned no content")]
    Empty,
}

impl From<ModelError> for AiError {
    fn from(err: ModelError) -> Self {
        AiError::Internal(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

pub struct OpenRouterClient {
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| ModelError::NotConfigured("OPENROUTER_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait::async_trait]
impl ModelClient for OpenRouterClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            max_tokens: request.max_output_tokens,
        };

        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("X-Title", "Cultura")
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_completion(&text)
    }
}

fn parse_completion(raw: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|e| ModelError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(ModelError::Empty)
}

/// Stand-in used when no API key is configured; every call fails.
pub struct UnconfiguredModel;

#[async_trait::async_trait]
impl ModelClient for UnconfiguredModel {
    fn model_name(&self) -> &str {
        "unconfigured"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured("OPENROUTER_API_KEY is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  Selamat datang!  "}}]}"#;
        assert_eq!(parse_completion(raw).unwrap(), "Selamat datang!");
    }

    #[test]
    fn empty_or_missing_content_is_an_error() {
        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(ModelError::Empty)));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ModelError::Empty)
        ));
        assert!(matches!(parse_completion("<html>"), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn request_serializes_sampling_parameters() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.5,
            top_p: 0.9,
            top_k: 40,
            max_tokens: 256,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["top_k"], 40);
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn upstream_errors_surface_as_internal() {
        let err: AiError = ModelError::Status { status: 503, body: "overloaded".into() }.into();
        assert_eq!(err.code(), "INTERNAL");
        assert!(!err.public_message().contains("overloaded"));
    }

    #[test]
    fn endpoint_is_derived_from_api_base() {
        let config = ModelConfig {
            api_key: Some("sk-test".into()),
            api_base: "http://localhost:9/v1/".into(),
            ..ModelConfig::default()
        };
        let client = OpenRouterClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9/v1/chat/completions");
        assert_eq!(client.model_name(), config.model);
    }
}
