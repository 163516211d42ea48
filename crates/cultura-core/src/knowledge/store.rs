//! In-memory knowledge store: entity snapshots plus contextual facts behind a
//! single reader/writer lock.
//!
//! Writes are upserts (last write wins, no versioning). Reads hand out clones,
//! so nothing borrowed from the store outlives the lock scope.

use super::entities::{
    BadgeAssignment, BadgeRecord, CityRecord, Entity, EntityKind, EventRecord, KnowledgeRecord,
    LocationRecord, ProfileRecord, ProvinceRecord, UserRecord,
};
use crate::error::{AiError, AiResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    records: HashMap<EntityKind, HashMap<String, KnowledgeRecord>>,
    /// Ordered so composed context is deterministic.
    facts: BTreeMap<String, String>,
}

impl Inner {
    fn lookup<T: Entity>(&self, id: &str) -> Option<&T> {
        self.records
            .get(&T::KIND)
            .and_then(|bucket| bucket.get(id))
            .and_then(T::from_record)
    }

    fn iter<T: Entity>(&self) -> impl Iterator<Item = &T> + '_ {
        self.records
            .get(&T::KIND)
            .into_iter()
            .flat_map(|bucket| bucket.values())
            .filter_map(T::from_record)
    }
}

/// Shared cache of denormalized domain data used to ground AI replies.
#[derive(Default)]
pub struct KnowledgeStore {
    inner: RwLock<Inner>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert by id. An empty id is logged and ignored; returns whether the
    /// entity was stored.
    pub fn put<T: Entity>(&self, entity: T) -> bool {
        let id = entity.id().trim().to_string();
        if id.is_empty() {
            tracing::warn!(
                target: "cultura::knowledge",
                kind = %T::KIND,
                "ignoring entity with empty id"
            );
            return false;
        }
        let record = entity.into_record();
        self.write()
            .records
            .entry(T::KIND)
            .or_default()
            .insert(id, record);
        true
    }

    /// Upsert a batch under one write lock. Returns how many were stored.
    pub fn put_all<T: Entity>(&self, entities: impl IntoIterator<Item = T>) -> usize {
        let mut stored = 0;
        let mut guard = self.write();
        for entity in entities {
            let id = entity.id().trim().to_string();
            if id.is_empty() {
                tracing::warn!(
                    target: "cultura::knowledge",
                    kind = %T::KIND,
                    "ignoring entity with empty id"
                );
                continue;
            }
            guard
                .records
                .entry(T::KIND)
                .or_default()
                .insert(id, entity.into_record());
            stored += 1;
        }
        stored
    }

    pub fn get<T: Entity>(&self, id: &str) -> AiResult<T> {
        self.read()
            .lookup::<T>(id.trim())
            .cloned()
            .ok_or_else(|| AiError::NotFound(format!("{} {}", T::KIND, id)))
    }

    pub fn contains<T: Entity>(&self, id: &str) -> bool {
        self.read().lookup::<T>(id.trim()).is_some()
    }

    /// All cached entities of one kind matching `filter`, ordered by id.
    pub fn list<T: Entity>(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        let mut out: Vec<T> = self.read().iter::<T>().filter(|e| filter(*e)).cloned().collect();
        out.sort_by(|a, b| a.id().cmp(b.id()));
        out
    }

    /// Badges awarded to `user_id`, ordered by badge name. Assignments whose
    /// badge is not cached are skipped.
    pub fn badges_for_user(&self, user_id: &str) -> Vec<BadgeRecord> {
        let guard = self.read();
        badges_for_user(&guard, user_id)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.read().records.get(&kind).map_or(0, HashMap::len)
    }

    /// Total number of cached entities across every kind.
    pub fn len(&self) -> usize {
        self.read().records.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_fact(&self, key: &str, text: &str) {
        let key = key.trim();
        if key.is_empty() {
            tracing::warn!(target: "cultura::knowledge", "ignoring contextual fact with empty key");
            return;
        }
        self.write().facts.insert(key.to_string(), text.to_string());
    }

    /// Narrative of everything currently known about `user_id` and, when
    /// given, `event_id`. Absent pieces are skipped; the result may be empty
    /// but composing never fails.
    pub fn build_context(&self, user_id: &str, event_id: Option<&str>) -> String {
        let guard = self.read();
        let mut sections: Vec<String> = Vec::new();

        let user_id = user_id.trim();
        if !user_id.is_empty() {
            if let Some(user) = guard.lookup::<UserRecord>(user_id) {
                sections.push(format!("User: {} (@{})", user.label(), user.username));
            }
            if let Some(profile) = guard.lookup::<ProfileRecord>(user_id) {
                let line = describe_profile(profile);
                if !line.is_empty() {
                    sections.push(line);
                }
            }
        }

        if let Some(event) = event_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| guard.lookup::<EventRecord>(id))
        {
            sections.push(describe_event(&guard, event));
        }

        if !user_id.is_empty() {
            let badges = badges_for_user(&guard, user_id);
            if !badges.is_empty() {
                let names: Vec<&str> = badges.iter().map(|b| b.name.as_str()).collect();
                sections.push(format!("Badges earned: {}", names.join(", ")));
            }
        }

        if !guard.facts.is_empty() {
            let lines: Vec<String> = guard
                .facts
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect();
            sections.push(format!("Additional context:\n{}", lines.join("\n")));
        }

        sections.join("\n")
    }
}

fn badges_for_user(inner: &Inner, user_id: &str) -> Vec<BadgeRecord> {
    let mut badges: Vec<BadgeRecord> = inner
        .iter::<BadgeAssignment>()
        .filter(|a| a.user_id == user_id)
        .filter_map(|a| inner.lookup::<BadgeRecord>(&a.badge_id))
        .cloned()
        .collect();
    badges.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    badges.dedup_by(|a, b| a.id == b.id);
    badges
}

fn describe_profile(profile: &ProfileRecord) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = profile.full_name.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("Name: {}", name.trim()));
    }
    if let Some(bio) = profile.bio.as_deref().filter(|s| !s.trim().is_empty()) {
        parts.push(format!("Bio: {}", bio.trim()));
    }
    if !profile.interests.is_empty() {
        parts.push(format!("Interests: {}", profile.interests.join(", ")));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!("Profile: {}", parts.join(". "))
    }
}

fn describe_event(inner: &Inner, event: &EventRecord) -> String {
    let mut line = format!("Event: {}", event.title);
    if let Some(category) = event.category.as_deref() {
        line.push_str(&format!(" ({})", category));
    }
    if let Some(starts) = event.starts_at {
        line.push_str(&format!(", starts {}", starts.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(location) = event
        .location_id
        .as_deref()
        .and_then(|id| inner.lookup::<LocationRecord>(id))
    {
        line.push_str(&format!(", at {}", location.name));
        if let Some(city) = location
            .city_id
            .as_deref()
            .and_then(|id| inner.lookup::<CityRecord>(id))
        {
            line.push_str(&format!(", {}", city.name));
            if let Some(province) = city
                .province_id
                .as_deref()
                .and_then(|id| inner.lookup::<ProvinceRecord>(id))
            {
                line.push_str(&format!(", {}", province.name));
            }
        }
    }
    if let Some(desc) = event.description.as_deref().filter(|s| !s.trim().is_empty()) {
        line.push_str(&format!(". {}", desc.trim()));
    }
    line
}
