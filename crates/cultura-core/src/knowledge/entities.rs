//! Denormalized snapshots of domain entities, as cached for prompt grounding.
//!
//! Every snapshot implements [`Entity`], which lets the store keep one generic
//! keyed map over the [`KnowledgeRecord`] union instead of one map per type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds the knowledge store can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Profile,
    Badge,
    BadgeAssignment,
    Event,
    Story,
    Province,
    City,
    Location,
    Thread,
    Message,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Profile => "profile",
            EntityKind::Badge => "badge",
            EntityKind::BadgeAssignment => "badge_assignment",
            EntityKind::Event => "event",
            EntityKind::Story => "story",
            EntityKind::Province => "province",
            EntityKind::City => "city",
            EntityKind::Location => "location",
            EntityKind::Thread => "thread",
            EntityKind::Message => "message",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(EntityKind::User),
            "profile" => Ok(EntityKind::Profile),
            "badge" => Ok(EntityKind::Badge),
            "badge_assignment" => Ok(EntityKind::BadgeAssignment),
            "event" => Ok(EntityKind::Event),
            "story" => Ok(EntityKind::Story),
            "province" => Ok(EntityKind::Province),
            "city" => Ok(EntityKind::City),
            "location" => Ok(EntityKind::Location),
            "thread" => Ok(EntityKind::Thread),
            "message" => Ok(EntityKind::Message),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserRecord {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// Profile is keyed by the owning user's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub home_city_id: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A badge awarded to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeAssignment {
    pub id: String,
    pub user_id: String,
    pub badge_id: String,
    #[serde(default)]
    pub awarded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Popularity signal used to rank trending events.
    #[serde(default)]
    pub interest_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: String,
    pub event_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub province_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Discussion thread, usually attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub author_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Tagged union of every cached snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum KnowledgeRecord {
    User(UserRecord),
    Profile(ProfileRecord),
    Badge(BadgeRecord),
    BadgeAssignment(BadgeAssignment),
    Event(EventRecord),
    Story(StoryRecord),
    Province(ProvinceRecord),
    City(CityRecord),
    Location(LocationRecord),
    Thread(ThreadRecord),
    Message(MessageRecord),
}

impl KnowledgeRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            KnowledgeRecord::User(_) => EntityKind::User,
            KnowledgeRecord::Profile(_) => EntityKind::Profile,
            KnowledgeRecord::Badge(_) => EntityKind::Badge,
            KnowledgeRecord::BadgeAssignment(_) => EntityKind::BadgeAssignment,
            KnowledgeRecord::Event(_) => EntityKind::Event,
            KnowledgeRecord::Story(_) => EntityKind::Story,
            KnowledgeRecord::Province(_) => EntityKind::Province,
            KnowledgeRecord::City(_) => EntityKind::City,
            KnowledgeRecord::Location(_) => EntityKind::Location,
            KnowledgeRecord::Thread(_) => EntityKind::Thread,
            KnowledgeRecord::Message(_) => EntityKind::Message,
        }
    }
}

/// A snapshot type the knowledge store can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Store key. String form of the entity's UUID.
    fn id(&self) -> &str;

    fn into_record(self) -> KnowledgeRecord;

    fn from_record(record: &KnowledgeRecord) -> Option<&Self>;
}

macro_rules! impl_entity {
    ($ty:ty, $variant:ident, $key:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$variant;

            fn id(&self) -> &str {
                &self.$key
            }

            fn into_record(self) -> KnowledgeRecord {
                KnowledgeRecord::$variant(self)
            }

            fn from_record(record: &KnowledgeRecord) -> Option<&Self> {
                match record {
                    KnowledgeRecord::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(UserRecord, User, id);
impl_entity!(ProfileRecord, Profile, user_id);
impl_entity!(BadgeRecord, Badge, id);
impl_entity!(BadgeAssignment, BadgeAssignment, id);
impl_entity!(EventRecord, Event, id);
impl_entity!(StoryRecord, Story, id);
impl_entity!(ProvinceRecord, Province, id);
impl_entity!(CityRecord, City, id);
impl_entity!(LocationRecord, Location, id);
impl_entity!(ThreadRecord, Thread, id);
impl_entity!(MessageRecord, Message, id);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [EntityKind::Event, EntityKind::City, EntityKind::BadgeAssignment] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("museum".parse::<EntityKind>().is_err());
    }

    #[test]
    fn profile_is_keyed_by_user() {
        let profile = ProfileRecord {
            user_id: "u-1".into(),
            full_name: None,
            bio: None,
            home_city_id: None,
            interests: vec![],
        };
        assert_eq!(profile.id(), "u-1");
        let record = profile.clone().into_record();
        assert_eq!(record.kind(), EntityKind::Profile);
        assert_eq!(ProfileRecord::from_record(&record), Some(&profile));
        assert!(UserRecord::from_record(&record).is_none());
    }
}
