//! Domain adapters: one per bounded context (cultural, place, user).
//!
//! An adapter pulls a bounded slice of live domain data into the shared
//! [`KnowledgeStore`] and renders a textual context fragment for a parameter
//! bag. Rendering is best effort: a missing or unparsable parameter, or a
//! source that fails mid-fetch, yields an empty fragment instead of an error.

mod cultural;
mod manager;
mod place;
mod user;

pub use cultural::CulturalAdapter;
pub use manager::{AdapterManager, LoadReport};
pub use place::PlaceAdapter;
pub use user::UserAdapter;

use crate::error::{AiError, AiResult};
use crate::knowledge::KnowledgeStore;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

pub const EVENT_ID: &str = "event_id";
pub const USER_ID: &str = "user_id";
pub const CITY_ID: &str = "city_id";
pub const LOCATION_ID: &str = "location_id";
pub const PROVINCE_ID: &str = "province_id";

/// Loosely typed parameter bag handed to [`DomainAdapter::build_context`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextParams {
    values: BTreeMap<String, String>,
}

impl ContextParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Entity id under `key`, only if it parses as a UUID.
    pub fn id(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(str::trim)
            .filter(|raw| uuid::Uuid::parse_str(raw).is_ok())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ContextParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[async_trait::async_trait]
pub trait DomainAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Bind the adapter to its store. Succeeds exactly once.
    fn initialize(&self, store: Arc<KnowledgeStore>) -> AiResult<()>;

    /// Pull a bounded sample of entities into the store. Whatever was stored
    /// before a failing fetch stays stored.
    async fn load_data(&self) -> AiResult<()>;

    /// Context fragment for `params`; empty when nothing relevant is known.
    /// Fails only when the adapter was never initialized.
    async fn build_context(&self, params: &ContextParams) -> AiResult<String>;
}

/// Write-once store handle shared by the concrete adapters.
#[derive(Default)]
pub(crate) struct StoreSlot(OnceLock<Arc<KnowledgeStore>>);

impl StoreSlot {
    pub(crate) fn bind(&self, adapter: &str, store: Arc<KnowledgeStore>) -> AiResult<()> {
        self.0
            .set(store)
            .map_err(|_| AiError::InvalidInput(format!("adapter {adapter} already initialized")))
    }

    pub(crate) fn get(&self) -> AiResult<&Arc<KnowledgeStore>> {
        self.0
            .get()
            .ok_or_else(|| AiError::InvalidInput("adapter not initialized".to_string()))
    }
}

/// Trim long free text for prompt context.
pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory source shared by the adapter tests.

    use crate::error::SourceError;
    use crate::knowledge::EventRecord;
    use crate::sources::{SeedCatalog, SeedData};

    pub const EVENT: &str = "4b1f3a6e-9c57-4c1e-8a34-0e5d8f3b2a01";
    pub const LOCATION: &str = "7d2c9e10-51aa-4f0b-9b7e-2f0c6d1e4b02";
    pub const CITY: &str = "1a9e7c55-3d2b-4e6f-8c1a-9b0d2e3f4c03";
    pub const PROVINCE: &str = "c3e8b1d2-7f4a-4c9e-a1b2-5d6e7f8a9b04";
    pub const USER: &str = "e5f6a7b8-1c2d-4e3f-9a0b-1c2d3e4f5a05";
    pub const BADGE: &str = "f0e1d2c3-b4a5-4968-8776-5a4b3c2d1e06";

    pub fn seed() -> SeedCatalog {
        let json = serde_json::json!({
            "users": [{"id": USER, "username": "ayu", "display_name": "Ayu"}],
            "profiles": [{"user_id": USER, "full_name": "Ayu Lestari", "interests": ["batik"]}],
            "badges": [{"id": BADGE, "name": "Culture Buff"}],
            "badge_assignments": [{"id": "a1", "user_id": USER, "badge_id": BADGE}],
            "events": [{
                "id": EVENT,
                "title": "Legong Dance",
                "category": "dance",
                "location_id": LOCATION,
                "interest_count": 12
            }],
            "stories": [{"id": "s1", "event_id": EVENT, "title": "Origins", "body": "Court dance of Bali."}],
            "threads": [{"id": "t1", "title": "Best seats?", "event_id": EVENT}],
            "messages": [{"id": "m1", "thread_id": "t1", "body": "Arrive early."}],
            "provinces": [{"id": PROVINCE, "name": "Bali"}],
            "cities": [{"id": CITY, "name": "Ubud", "province_id": PROVINCE}],
            "locations": [{"id": LOCATION, "name": "Ubud Palace", "city_id": CITY}]
        });
        SeedCatalog::new(serde_json::from_value::<SeedData>(json).unwrap())
    }

    /// Source that fails every call.
    pub struct BrokenSource;

    fn down<T>() -> Result<T, SourceError> {
        Err(SourceError::Unavailable("connection refused".into()))
    }

    #[async_trait::async_trait]
    impl crate::sources::CulturalSource for BrokenSource {
        async fn trending_events(&self, _: usize) -> Result<Vec<EventRecord>, SourceError> {
            down()
        }
        async fn event(&self, _: &str) -> Result<EventRecord, SourceError> {
            down()
        }
        async fn stories_for_event(&self, _: &str, _: usize) -> Result<Vec<crate::knowledge::StoryRecord>, SourceError> {
            down()
        }
        async fn threads_for_event(&self, _: &str, _: usize) -> Result<Vec<crate::knowledge::ThreadRecord>, SourceError> {
            down()
        }
        async fn thread_messages(&self, _: &str, _: usize) -> Result<Vec<crate::knowledge::MessageRecord>, SourceError> {
            down()
        }
    }
}
