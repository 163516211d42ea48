//! Knowledge layer: entity snapshots and the shared store that holds them.

pub mod entities;
mod store;

pub use entities::{
    BadgeAssignment, BadgeRecord, CityRecord, Entity, EntityKind, EventRecord, KnowledgeRecord,
    LocationRecord, MessageRecord, ProfileRecord, ProvinceRecord, StoryRecord, ThreadRecord,
    UserRecord,
};
pub use store::KnowledgeStore;
