//! Cultura core: AI interaction layer for the cultural-tourism backend.
//!
//! Turns domain data (users, events, places, badges, discussions) into
//! context-grounded chat sessions while keeping the upstream model behind a
//! global rate limit.

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod quality;
pub mod rate_limit;
pub mod sessions;
pub mod sources;

pub use adapters::{
    AdapterManager, ContextParams, CulturalAdapter, DomainAdapter, LoadReport, PlaceAdapter,
    UserAdapter,
};
pub use config::AiConfig;
pub use context::CallContext;
pub use error::{AiError, AiResult, SourceError};
pub use knowledge::KnowledgeStore;
pub use model::{GenerationRequest, ModelClient, ModelError, OpenRouterClient, UnconfiguredModel};
pub use orchestrator::{AiOrchestrator, ChatReply, DescriptionKind};
pub use policy::{PolicyBlock, PolicyCatalogue};
pub use rate_limit::RateLimiter;
pub use sessions::{ChatMessage, ChatRole, ChatSession, SessionStore};
pub use sources::{CulturalSource, PlaceSource, SeedCatalog, SeedData, UserSource};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
