use super::{ContextParams, DomainAdapter, StoreSlot, USER_ID};
use crate::config::AdapterLimits;
use crate::error::{AiError, AiResult};
use crate::knowledge::{BadgeRecord, KnowledgeStore, ProfileRecord, UserRecord};
use crate::sources::UserSource;
use std::sync::Arc;

/// Users, profiles and the badge catalogue.
///
/// Bulk loading only covers the badge catalogue; individual users are pulled
/// on first reference through [`UserAdapter::load_user_data`].
pub struct UserAdapter {
    source: Arc<dyn UserSource>,
    limits: AdapterLimits,
    store: StoreSlot,
}

impl UserAdapter {
    pub fn new(source: Arc<dyn UserSource>, limits: AdapterLimits) -> Self {
        Self {
            source,
            limits,
            store: StoreSlot::default(),
        }
    }

    /// Fetch one user's record, profile and badge assignments into the store.
    pub async fn load_user_data(&self, user_id: &str) -> AiResult<()> {
        let store = self.store.get()?;
        let user_id = user_id.trim();
        if uuid::Uuid::parse_str(user_id).is_err() {
            return Err(AiError::InvalidInput(format!("user id {user_id:?} is not a UUID")));
        }

        let user = self.source.user(user_id).await?;
        let profile = self.source.profile(user_id).await?;
        let assignments = self.source.badge_assignments(user_id).await?;

        let mut missing_badges: Vec<String> = assignments
            .iter()
            .filter(|a| !store.contains::<BadgeRecord>(&a.badge_id))
            .map(|a| a.badge_id.clone())
            .collect();
        missing_badges.sort();
        missing_badges.dedup();

        store.put(user);
        if let Some(profile) = profile {
            store.put(profile);
        }
        store.put_all(assignments);

        for badge_id in missing_badges {
            match self.source.badge(&badge_id).await {
                Ok(badge) => {
                    store.put(badge);
                }
                Err(e) => tracing::warn!(
                    target: "cultura::adapters",
                    adapter = "user",
                    badge_id = %badge_id,
                    error = %e,
                    "badge lookup failed"
                ),
            }
        }
        Ok(())
    }

    fn render(store: &KnowledgeStore, user: &UserRecord) -> String {
        let mut lines = vec![format!("User: {} (@{})", user.label(), user.username)];
        if let Ok(profile) = store.get::<ProfileRecord>(&user.id) {
            if let Some(name) = profile.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
                lines.push(format!("Name: {}", name.trim()));
            }
            if let Some(bio) = profile.bio.as_deref().filter(|b| !b.trim().is_empty()) {
                lines.push(format!("Bio: {}", bio.trim()));
            }
            if !profile.interests.is_empty() {
                lines.push(format!("Interests: {}", profile.interests.join(", ")));
            }
        }
        let badges = store.badges_for_user(&user.id);
        if !badges.is_empty() {
            let names: Vec<&str> = badges.iter().map(|b| b.name.as_str()).collect();
            lines.push(format!("Badges earned: {}", names.join(", ")));
        }
        lines.join("\n")
    }
}

#[async_trait::async_trait]
impl DomainAdapter for UserAdapter {
    fn name(&self) -> &str {
        "user"
    }

    fn initialize(&self, store: Arc<KnowledgeStore>) -> AiResult<()> {
        self.store.bind(self.name(), store)
    }

    async fn load_data(&self) -> AiResult<()> {
        let store = self.store.get()?;
        let badges = self.source.badges(self.limits.badges).await?;
        store.put_all(badges);
        Ok(())
    }

    async fn build_context(&self, params: &ContextParams) -> AiResult<String> {
        let store = self.store.get()?;
        let Some(user_id) = params.id(USER_ID) else {
            return Ok(String::new());
        };
        if !store.contains::<UserRecord>(user_id) {
            if let Err(e) = self.load_user_data(user_id).await {
                tracing::warn!(target: "cultura::adapters", adapter = "user", user_id, error = %e, "user context unavailable");
                return Ok(String::new());
            }
        }
        Ok(store
            .get::<UserRecord>(user_id)
            .map(|user| Self::render(store, &user))
            .unwrap_or_default())
    }
}
