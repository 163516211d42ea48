//! JSON-backed catalogue implementing every source trait. Used by the gateway
//! for local runs and by tests.

use super::{CulturalSource, PlaceSource, SourceResult, UserSource};
use crate::error::SourceError;
use crate::knowledge::{
    BadgeAssignment, BadgeRecord, CityRecord, EventRecord, LocationRecord, MessageRecord,
    ProfileRecord, ProvinceRecord, StoryRecord, ThreadRecord, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk layout of a seed file. Every list is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub users: Vec<UserRecord>,
    pub profiles: Vec<ProfileRecord>,
    pub badges: Vec<BadgeRecord>,
    pub badge_assignments: Vec<BadgeAssignment>,
    pub events: Vec<EventRecord>,
    pub stories: Vec<StoryRecord>,
    pub provinces: Vec<ProvinceRecord>,
    pub cities: Vec<CityRecord>,
    pub locations: Vec<LocationRecord>,
    pub threads: Vec<ThreadRecord>,
    pub messages: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    data: SeedData,
}

impl SeedCatalog {
    pub fn new(data: SeedData) -> Self {
        Self { data }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SourceError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

fn find<'a, T>(items: &'a [T], entity: &'static str, id: &str, key: impl Fn(&T) -> &str) -> SourceResult<&'a T> {
    items
        .iter()
        .find(|item| key(item) == id)
        .ok_or_else(|| SourceError::NotFound { entity, id: id.to_string() })
}

#[async_trait::async_trait]
impl CulturalSource for SeedCatalog {
    async fn trending_events(&self, limit: usize) -> SourceResult<Vec<EventRecord>> {
        let mut events = self.data.events.clone();
        events.sort_by(|a, b| b.interest_count.cmp(&a.interest_count).then_with(|| a.id.cmp(&b.id)));
        events.truncate(limit);
        Ok(events)
    }

    async fn event(&self, id: &str) -> SourceResult<EventRecord> {
        find(&self.data.events, "event", id, |e| e.id.as_str()).cloned()
    }

    async fn stories_for_event(&self, event_id: &str, limit: usize) -> SourceResult<Vec<StoryRecord>> {
        Ok(self
            .data
            .stories
            .iter()
            .filter(|s| s.event_id == event_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn threads_for_event(&self, event_id: &str, limit: usize) -> SourceResult<Vec<ThreadRecord>> {
        Ok(self
            .data
            .threads
            .iter()
            .filter(|t| t.event_id.as_deref() == Some(event_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn thread_messages(&self, thread_id: &str, limit: usize) -> SourceResult<Vec<MessageRecord>> {
        let mut messages: Vec<MessageRecord> = self
            .data
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages.truncate(limit);
        Ok(messages)
    }
}

#[async_trait::async_trait]
impl PlaceSource for SeedCatalog {
    async fn provinces(&self, limit: usize) -> SourceResult<Vec<ProvinceRecord>> {
        Ok(self.data.provinces.iter().take(limit).cloned().collect())
    }

    async fn province(&self, id: &str) -> SourceResult<ProvinceRecord> {
        find(&self.data.provinces, "province", id, |p| p.id.as_str()).cloned()
    }

    async fn cities_in_province(&self, province_id: &str, limit: usize) -> SourceResult<Vec<CityRecord>> {
        Ok(self
            .data
            .cities
            .iter()
            .filter(|c| c.province_id.as_deref() == Some(province_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn city(&self, id: &str) -> SourceResult<CityRecord> {
        find(&self.data.cities, "city", id, |c| c.id.as_str()).cloned()
    }

    async fn locations_in_city(&self, city_id: &str, limit: usize) -> SourceResult<Vec<LocationRecord>> {
        Ok(self
            .data
            .locations
            .iter()
            .filter(|l| l.city_id.as_deref() == Some(city_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn location(&self, id: &str) -> SourceResult<LocationRecord> {
        find(&self.data.locations, "location", id, |l| l.id.as_str()).cloned()
    }
}

#[async_trait::async_trait]
impl UserSource for SeedCatalog {
    async fn user(&self, id: &str) -> SourceResult<UserRecord> {
        find(&self.data.users, "user", id, |u| u.id.as_str()).cloned()
    }

    async fn profile(&self, user_id: &str) -> SourceResult<Option<ProfileRecord>> {
        Ok(self.data.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn badge_assignments(&self, user_id: &str) -> SourceResult<Vec<BadgeAssignment>> {
        Ok(self
            .data
            .badge_assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn badge(&self, id: &str) -> SourceResult<BadgeRecord> {
        find(&self.data.badges, "badge", id, |b| b.id.as_str()).cloned()
    }

    async fn badges(&self, limit: usize) -> SourceResult<Vec<BadgeRecord>> {
        Ok(self.data.badges.iter().take(limit).cloned().collect())
    }
}
