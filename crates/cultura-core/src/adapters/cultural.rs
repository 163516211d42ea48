use super::place::PlaceReader;
use super::{clip, ContextParams, DomainAdapter, StoreSlot, EVENT_ID};
use crate::config::AdapterLimits;
use crate::error::AiResult;
use crate::knowledge::{
    CityRecord, EventRecord, KnowledgeStore, LocationRecord, MessageRecord, ProvinceRecord,
    StoryRecord, ThreadRecord,
};
use crate::sources::{CulturalSource, PlaceSource};
use std::sync::Arc;

const STORY_CHARS: usize = 280;
const MESSAGE_CHARS: usize = 160;

/// Events, stories and the discussion threads attached to them. The place
/// source resolves where an event happens.
pub struct CulturalAdapter {
    source: Arc<dyn CulturalSource>,
    places: PlaceReader,
    limits: AdapterLimits,
    store: StoreSlot,
}

impl CulturalAdapter {
    pub fn new(source: Arc<dyn CulturalSource>, places: Arc<dyn PlaceSource>, limits: AdapterLimits) -> Self {
        Self {
            source,
            places: PlaceReader::new(places, limits.clone()),
            limits,
            store: StoreSlot::default(),
        }
    }

    /// Cache one event with its bounded stories, threads and messages.
    async fn cache_event(&self, store: &KnowledgeStore, event: EventRecord) -> AiResult<()> {
        let event_id = event.id.clone();
        store.put(event);

        let stories = self
            .source
            .stories_for_event(&event_id, self.limits.stories_per_event)
            .await?;
        store.put_all(stories);

        let threads = self
            .source
            .threads_for_event(&event_id, self.limits.threads_per_event)
            .await?;
        for thread in threads {
            let messages = self
                .source
                .thread_messages(&thread.id, self.limits.messages_per_thread)
                .await?;
            store.put(thread);
            store.put_all(messages);
        }
        Ok(())
    }

    async fn ensure_event(&self, store: &KnowledgeStore, event_id: &str) -> AiResult<EventRecord> {
        if let Ok(event) = store.get::<EventRecord>(event_id) {
            return Ok(event);
        }
        let event = self.source.event(event_id).await?;
        self.cache_event(store, event.clone()).await?;
        Ok(event)
    }

    fn render(&self, store: &KnowledgeStore, event: &EventRecord) -> String {
        let mut lines = vec![format!("Event: {}", event.title)];
        if let Some(category) = event.category.as_deref() {
            lines.push(format!("Category: {}", category));
        }
        match (event.starts_at, event.ends_at) {
            (Some(start), Some(end)) => lines.push(format!(
                "When: {} until {}",
                start.format("%Y-%m-%d %H:%M UTC"),
                end.format("%Y-%m-%d %H:%M UTC")
            )),
            (Some(start), None) => lines.push(format!("When: {}", start.format("%Y-%m-%d %H:%M UTC"))),
            _ => {}
        }
        if let Some(place) = event
            .location_id
            .as_deref()
            .and_then(|id| place_chain(store, id))
        {
            lines.push(format!("Where: {}", place));
        }
        if let Some(desc) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(format!("About: {}", clip(desc, STORY_CHARS)));
        }

        let stories = store.list::<StoryRecord>(|s| s.event_id == event.id);
        if !stories.is_empty() {
            lines.push("Stories:".to_string());
            for story in stories.iter().take(self.limits.stories_per_event) {
                lines.push(format!("- {}: {}", story.title, clip(&story.body, STORY_CHARS)));
            }
        }

        let threads = store.list::<ThreadRecord>(|t| t.event_id.as_deref() == Some(event.id.as_str()));
        if !threads.is_empty() {
            lines.push("Recent discussion:".to_string());
            for thread in threads.iter().take(self.limits.threads_per_event) {
                let mut messages = store.list::<MessageRecord>(|m| m.thread_id == thread.id);
                messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                match messages.first() {
                    Some(latest) => lines.push(format!(
                        "- {}: \"{}\"",
                        thread.title,
                        clip(&latest.body, MESSAGE_CHARS)
                    )),
                    None => lines.push(format!("- {}", thread.title)),
                }
            }
        }
        lines.join("\n")
    }
}

/// "Location, City, Province" from whatever is cached.
pub(crate) fn place_chain(store: &KnowledgeStore, location_id: &str) -> Option<String> {
    let location = store.get::<LocationRecord>(location_id).ok()?;
    let mut parts = vec![location.name];
    if let Some(city) = location
        .city_id
        .as_deref()
        .and_then(|id| store.get::<CityRecord>(id).ok())
    {
        parts.push(city.name);
        if let Some(province) = city
            .province_id
            .as_deref()
            .and_then(|id| store.get::<ProvinceRecord>(id).ok())
        {
            parts.push(province.name);
        }
    }
    Some(parts.join(", "))
}

#[async_trait::async_trait]
impl DomainAdapter for CulturalAdapter {
    fn name(&self) -> &str {
        "cultural"
    }

    fn initialize(&self, store: Arc<KnowledgeStore>) -> AiResult<()> {
        self.store.bind(self.name(), store)
    }

    async fn load_data(&self) -> AiResult<()> {
        let store = self.store.get()?;
        let events = self.source.trending_events(self.limits.trending_events).await?;
        let count = events.len();
        for event in events {
            self.cache_event(store, event).await?;
        }
        tracing::debug!(target: "cultura::adapters", adapter = "cultural", events = count, "loaded trending events");
        Ok(())
    }

    async fn build_context(&self, params: &ContextParams) -> AiResult<String> {
        let store = self.store.get()?;
        let Some(event_id) = params.id(EVENT_ID) else {
            return Ok(String::new());
        };
        match self.ensure_event(store, event_id).await {
            Ok(event) => {
                if let Some(location_id) = event.location_id.as_deref() {
                    if let Err(e) = self.places.ensure_location(store, location_id).await {
                        tracing::warn!(
                            target: "cultura::adapters",
                            adapter = "cultural",
                            event_id,
                            location_id,
                            error = %e,
                            "event venue unavailable"
                        );
                    }
                }
                Ok(self.render(store, &event))
            }
            Err(e) => {
                tracing::warn!(
                    target: "cultura::adapters",
                    adapter = "cultural",
                    event_id,
                    error = %e,
                    "event context unavailable"
                );
                Ok(String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{self, BrokenSource};
    use super::*;
    use crate::knowledge::EntityKind;

    fn adapter() -> (CulturalAdapter, Arc<KnowledgeStore>) {
        let store = Arc::new(KnowledgeStore::new());
        let seed = Arc::new(testing::seed());
        let adapter = CulturalAdapter::new(seed.clone(), seed, AdapterLimits::default());
        adapter.initialize(Arc::clone(&store)).unwrap();
        (adapter, store)
    }

    #[tokio::test]
    async fn load_data_caches_events_and_their_relations() {
        let (adapter, store) = adapter();
        adapter.load_data().await.unwrap();
        assert_eq!(store.count(EntityKind::Event), 1);
        assert_eq!(store.count(EntityKind::Story), 1);
        assert_eq!(store.count(EntityKind::Thread), 1);
        assert_eq!(store.count(EntityKind::Message), 1);
    }

    #[tokio::test]
    async fn context_reads_through_on_cache_miss() {
        let (adapter, store) = adapter();
        let params = ContextParams::new().with(EVENT_ID, testing::EVENT);
        let ctx = adapter.build_context(&params).await.unwrap();
        assert!(ctx.starts_with("Event: Legong Dance"));
        assert!(ctx.contains("- Origins: Court dance of Bali."));
        assert!(ctx.contains("- Best seats?: \"Arrive early.\""));
        assert!(store.contains::<EventRecord>(testing::EVENT));
    }

    #[tokio::test]
    async fn event_venue_is_read_through_without_place_load() {
        let (adapter, store) = adapter();
        adapter.load_data().await.unwrap();
        assert!(!store.contains::<LocationRecord>(testing::LOCATION));

        let params = ContextParams::new().with(EVENT_ID, testing::EVENT);
        let ctx = adapter.build_context(&params).await.unwrap();
        assert!(ctx.contains("\nWhere: Ubud Palace, Ubud, Bali\n"), "{ctx}");
        assert!(store.contains::<CityRecord>(testing::CITY));
        assert!(store.contains::<ProvinceRecord>(testing::PROVINCE));
    }

    #[tokio::test]
    async fn missing_venue_keeps_the_event_fragment() {
        let seed = Arc::new(testing::seed());
        let adapter = CulturalAdapter::new(seed, Arc::new(crate::sources::SeedCatalog::default()), AdapterLimits::default());
        adapter.initialize(Arc::new(KnowledgeStore::new())).unwrap();
        let params = ContextParams::new().with(EVENT_ID, testing::EVENT);
        let ctx = adapter.build_context(&params).await.unwrap();
        assert!(ctx.starts_with("Event: Legong Dance\nCategory: dance"));
        assert!(!ctx.contains("Where:"));
    }

    #[tokio::test]
    async fn unusable_params_give_empty_fragment() {
        let (adapter, _) = adapter();
        assert_eq!(adapter.build_context(&ContextParams::new()).await.unwrap(), "");
        let params = ContextParams::new().with(EVENT_ID, "legong");
        assert_eq!(adapter.build_context(&params).await.unwrap(), "");
    }

    #[tokio::test]
    async fn failing_source_degrades_to_empty_fragment() {
        let adapter = CulturalAdapter::new(Arc::new(BrokenSource), Arc::new(testing::seed()), AdapterLimits::default());
        adapter.initialize(Arc::new(KnowledgeStore::new())).unwrap();
        let params = ContextParams::new().with(EVENT_ID, testing::EVENT);
        assert_eq!(adapter.build_context(&params).await.unwrap(), "");
        assert_eq!(adapter.load_data().await.unwrap_err().code(), "INTERNAL");
    }

    #[tokio::test]
    async fn use_before_initialize_is_rejected() {
        let seed = Arc::new(testing::seed());
        let adapter = CulturalAdapter::new(seed.clone(), seed, AdapterLimits::default());
        let err = adapter.load_data().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = adapter.build_context(&ContextParams::new()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
