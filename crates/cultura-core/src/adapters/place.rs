use super::cultural::place_chain;
use super::{clip, ContextParams, DomainAdapter, StoreSlot, CITY_ID, LOCATION_ID, PROVINCE_ID};
use crate::config::AdapterLimits;
use crate::error::AiResult;
use crate::knowledge::{CityRecord, KnowledgeStore, LocationRecord, ProvinceRecord};
use crate::sources::PlaceSource;
use std::sync::Arc;

const DESCRIPTION_CHARS: usize = 280;

/// Read-through lookups over the place hierarchy. Every fetched level is
/// cached along with its parents, so a cached location always renders with
/// its city and province when the source has them.
pub(crate) struct PlaceReader {
    source: Arc<dyn PlaceSource>,
    limits: AdapterLimits,
}

impl PlaceReader {
    pub(crate) fn new(source: Arc<dyn PlaceSource>, limits: AdapterLimits) -> Self {
        Self { source, limits }
    }

    pub(crate) async fn ensure_province(&self, store: &KnowledgeStore, id: &str) -> AiResult<ProvinceRecord> {
        if let Ok(province) = store.get::<ProvinceRecord>(id) {
            return Ok(province);
        }
        let province = self.source.province(id).await?;
        let cities = self
            .source
            .cities_in_province(id, self.limits.cities_per_province)
            .await?;
        store.put(province.clone());
        store.put_all(cities);
        Ok(province)
    }

    pub(crate) async fn ensure_city(&self, store: &KnowledgeStore, id: &str) -> AiResult<CityRecord> {
        let city = match store.get::<CityRecord>(id) {
            Ok(city) => city,
            Err(_) => {
                let city = self.source.city(id).await?;
                let locations = self
                    .source
                    .locations_in_city(id, self.limits.locations_per_city)
                    .await?;
                store.put(city.clone());
                store.put_all(locations);
                city
            }
        };
        if let Some(province_id) = city.province_id.as_deref() {
            if !store.contains::<ProvinceRecord>(province_id) {
                store.put(self.source.province(province_id).await?);
            }
        }
        Ok(city)
    }

    pub(crate) async fn ensure_location(&self, store: &KnowledgeStore, id: &str) -> AiResult<LocationRecord> {
        let location = match store.get::<LocationRecord>(id) {
            Ok(location) => location,
            Err(_) => {
                let location = self.source.location(id).await?;
                store.put(location.clone());
                location
            }
        };
        if let Some(city_id) = location.city_id.as_deref() {
            self.ensure_city(store, city_id).await?;
        }
        Ok(location)
    }
}

/// Province → city → location hierarchy.
pub struct PlaceAdapter {
    reader: PlaceReader,
    source: Arc<dyn PlaceSource>,
    limits: AdapterLimits,
    store: StoreSlot,
}

impl PlaceAdapter {
    pub fn new(source: Arc<dyn PlaceSource>, limits: AdapterLimits) -> Self {
        Self {
            reader: PlaceReader::new(Arc::clone(&source), limits.clone()),
            source,
            limits,
            store: StoreSlot::default(),
        }
    }

    fn render_city(&self, store: &KnowledgeStore, city: &CityRecord) -> String {
        let mut heading = format!("City: {}", city.name);
        if let Some(province) = city
            .province_id
            .as_deref()
            .and_then(|id| store.get::<ProvinceRecord>(id).ok())
        {
            heading.push_str(&format!(", {}", province.name));
        }
        let mut lines = vec![heading];
        if let Some(desc) = city.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(format!("About: {}", clip(desc, DESCRIPTION_CHARS)));
        }
        let places: Vec<String> = store
            .list::<LocationRecord>(|l| l.city_id.as_deref() == Some(city.id.as_str()))
            .into_iter()
            .take(self.limits.locations_per_city)
            .map(|l| l.name)
            .collect();
        if !places.is_empty() {
            lines.push(format!("Places in {}: {}", city.name, places.join(", ")));
        }
        lines.join("\n")
    }

    fn render_location(&self, store: &KnowledgeStore, location: &LocationRecord) -> String {
        let mut lines = vec![format!(
            "Location: {}",
            place_chain(store, &location.id).unwrap_or_else(|| location.name.clone())
        )];
        if let Some(address) = location.address.as_deref().filter(|a| !a.trim().is_empty()) {
            lines.push(format!("Address: {}", address.trim()));
        }
        if let Some(desc) = location.description.as_deref().filter(|d| !d.trim().is_empty()) {
            lines.push(format!("About: {}", clip(desc, DESCRIPTION_CHARS)));
        }
        lines.join("\n")
    }

    fn render_province(&self, store: &KnowledgeStore, province: &ProvinceRecord) -> String {
        let cities: Vec<String> = store
            .list::<CityRecord>(|c| c.province_id.as_deref() == Some(province.id.as_str()))
            .into_iter()
            .take(self.limits.cities_per_province)
            .map(|c| c.name)
            .collect();
        if cities.is_empty() {
            format!("Province: {}", province.name)
        } else {
            format!("Province: {}\nCities: {}", province.name, cities.join(", "))
        }
    }

    async fn fragment(&self, store: &KnowledgeStore, params: &ContextParams) -> AiResult<Vec<String>> {
        let mut sections = Vec::new();
        if let Some(id) = params.id(LOCATION_ID) {
            let location = self.reader.ensure_location(store, id).await?;
            sections.push(self.render_location(store, &location));
        }
        if let Some(id) = params.id(CITY_ID) {
            let city = self.reader.ensure_city(store, id).await?;
            sections.push(self.render_city(store, &city));
        }
        if let Some(id) = params.id(PROVINCE_ID) {
            let province = self.reader.ensure_province(store, id).await?;
            sections.push(self.render_province(store, &province));
        }
        Ok(sections)
    }
}

#[async_trait::async_trait]
impl DomainAdapter for PlaceAdapter {
    fn name(&self) -> &str {
        "place"
    }

    fn initialize(&self, store: Arc<KnowledgeStore>) -> AiResult<()> {
        self.store.bind(self.name(), store)
    }

    async fn load_data(&self) -> AiResult<()> {
        let store = self.store.get()?;
        let provinces = self.source.provinces(self.limits.provinces).await?;
        for province in provinces {
            let cities = self
                .source
                .cities_in_province(&province.id, self.limits.cities_per_province)
                .await?;
            store.put(province);
            for city in cities {
                let locations = self
                    .source
                    .locations_in_city(&city.id, self.limits.locations_per_city)
                    .await?;
                store.put(city);
                store.put_all(locations);
            }
        }
        Ok(())
    }

    async fn build_context(&self, params: &ContextParams) -> AiResult<String> {
        let store = self.store.get()?;
        match self.fragment(store, params).await {
            Ok(sections) => Ok(sections.join("\n")),
            Err(e) => {
                tracing::warn!(target: "cultura::adapters", adapter = "place", error = %e, "place context unavailable");
                Ok(String::new())
            }
        }
    }
}
