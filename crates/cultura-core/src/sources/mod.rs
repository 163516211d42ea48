//! Domain data sources consumed by the adapters.
//!
//! One trait per bounded context. The backing store (managed Postgres, a REST
//! facade, a seed file) is an external collaborator: callers only assume that a
//! call may fail and may be slow.

mod seed;

pub use seed::{SeedCatalog, SeedData};

use crate::error::SourceError;
use crate::knowledge::{
    BadgeAssignment, BadgeRecord, CityRecord, EventRecord, LocationRecord, MessageRecord,
    ProfileRecord, ProvinceRecord, StoryRecord, ThreadRecord, UserRecord,
};

pub type SourceResult<T> = Result<T, SourceError>;

/// Events, their stories and the discussion around them.
#[async_trait::async_trait]
pub trait CulturalSource: Send + Sync {
    /// Most popular events first.
    async fn trending_events(&self, limit: usize) -> SourceResult<Vec<EventRecord>>;

    async fn event(&self, id: &str) -> SourceResult<EventRecord>;

    async fn stories_for_event(&self, event_id: &str, limit: usize) -> SourceResult<Vec<StoryRecord>>;

    async fn threads_for_event(&self, event_id: &str, limit: usize) -> SourceResult<Vec<ThreadRecord>>;

    /// Newest messages first.
    async fn thread_messages(&self, thread_id: &str, limit: usize) -> SourceResult<Vec<MessageRecord>>;
}

/// Province → city → location hierarchy.
#[async_trait::async_trait]
pub trait PlaceSource: Send + Sync {
    async fn provinces(&self, limit: usize) -> SourceResult<Vec<ProvinceRecord>>;

    async fn province(&self, id: &str) -> SourceResult<ProvinceRecord>;

    async fn cities_in_province(&self, province_id: &str, limit: usize) -> SourceResult<Vec<CityRecord>>;

    async fn city(&self, id: &str) -> SourceResult<CityRecord>;

    async fn locations_in_city(&self, city_id: &str, limit: usize) -> SourceResult<Vec<LocationRecord>>;

    async fn location(&self, id: &str) -> SourceResult<LocationRecord>;
}

/// Users, profiles and badges.
#[async_trait::async_trait]
pub trait UserSource: Send + Sync {
    async fn user(&self, id: &str) -> SourceResult<UserRecord>;

    /// `None` when the user never filled in a profile.
    async fn profile(&self, user_id: &str) -> SourceResult<Option<ProfileRecord>>;

    async fn badge_assignments(&self, user_id: &str) -> SourceResult<Vec<BadgeAssignment>>;

    async fn badge(&self, id: &str) -> SourceResult<BadgeRecord>;

    async fn badges(&self, limit: usize) -> SourceResult<Vec<BadgeRecord>>;
}
