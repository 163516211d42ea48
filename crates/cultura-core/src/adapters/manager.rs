use super::{ContextParams, DomainAdapter};
use crate::error::{AiError, AiResult};
use crate::knowledge::KnowledgeStore;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Outcome of one [`AdapterManager::load_all_data`] fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub succeeded: Vec<String>,
    /// Adapter name and the failure it reported.
    pub failed: Vec<(String, String)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

type Registered = (String, Arc<dyn DomainAdapter>);

/// Registry of domain adapters sharing one knowledge store.
///
/// Adapters run in registration order, so composed context is reproducible.
/// A failing adapter never prevents the others from running.
pub struct AdapterManager {
    store: Arc<KnowledgeStore>,
    adapters: RwLock<Vec<Registered>>,
}

impl AdapterManager {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self {
            store,
            adapters: RwLock::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Initialize `adapter` against the shared store and add it to the registry.
    pub fn register_adapter(&self, name: &str, adapter: Arc<dyn DomainAdapter>) -> AiResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AiError::InvalidInput("adapter name is empty".to_string()));
        }
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        if adapters.iter().any(|(n, _)| n == name) {
            return Err(AiError::InvalidInput(format!("adapter {name} already registered")));
        }
        adapter.initialize(Arc::clone(&self.store))?;
        adapters.push((name.to_string(), adapter));
        tracing::info!(target: "cultura::adapters", adapter = name, "adapter registered");
        Ok(())
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|(name, _)| name).collect()
    }

    fn snapshot(&self) -> Vec<Registered> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run every adapter's `load_data` concurrently. Failures are logged and
    /// reported, never propagated.
    pub async fn load_all_data(&self) -> LoadReport {
        let adapters = self.snapshot();
        let results = join_all(adapters.iter().map(|(_, adapter)| adapter.load_data())).await;

        let mut report = LoadReport::default();
        for ((name, _), result) in adapters.iter().zip(results) {
            match result {
                Ok(()) => report.succeeded.push(name.clone()),
                Err(e) => {
                    tracing::warn!(target: "cultura::adapters", adapter = %name, error = %e, "adapter load failed");
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }
        tracing::info!(
            target: "cultura::adapters",
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            entities = self.store.len(),
            "knowledge load finished"
        );
        report
    }

    /// Every adapter's fragment for `params`, non-empty ones joined by a blank line.
    pub async fn build_comprehensive_context(&self, params: &ContextParams) -> String {
        let adapters = self.snapshot();
        let results = join_all(adapters.iter().map(|(_, adapter)| adapter.build_context(params))).await;

        let mut fragments = Vec::new();
        for ((name, _), result) in adapters.iter().zip(results) {
            match result {
                Ok(fragment) if !fragment.trim().is_empty() => fragments.push(fragment),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "cultura::adapters", adapter = %name, error = %e, "adapter context failed")
                }
            }
        }
        fragments.join("\n\n")
    }
}
