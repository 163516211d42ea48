//! AI orchestrator: the entry point request handlers talk to.
//!
//! A chat turn goes: limiter admits → session resolved → context gathered
//! (knowledge narrative plus adapter fragments) → policy, context, transcript
//! and query composed → model called under the call deadline → reply checked
//! by the quality gate → user query and reply appended to the session.
//!
//! Nothing touches the session until a reply is in hand, so a cancelled or
//! failed call leaves the transcript as it was.

use crate::adapters::{
    AdapterManager, ContextParams, CulturalAdapter, DomainAdapter, LoadReport, PlaceAdapter,
    UserAdapter, CITY_ID, EVENT_ID, LOCATION_ID, PROVINCE_ID,
};
use crate::config::{AiConfig, ModelConfig};
use crate::context::{CallContext, Interrupted};
use crate::error::{AiError, AiResult};
use crate::knowledge::{KnowledgeStore, UserRecord};
use crate::model::{GenerationRequest, ModelClient};
use crate::policy::{PolicyCatalogue, CHAT_BLOCKS, DESCRIPTION_BLOCKS};
use crate::quality::{clean_reply, display_lines, QualityGate};
use crate::rate_limit::RateLimiter;
use crate::sessions::{ChatMessage, ChatRole, ChatSession, SessionStore};
use crate::sources::{CulturalSource, PlaceSource, UserSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Only the most recent turns are replayed to the model.
const TRANSCRIPT_WINDOW: usize = 20;

/// A reply plus its display lines (markdown emphasis stripped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub text: String,
    pub lines: Vec<String>,
}

/// Entity kinds a standalone description can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionKind {
    Event,
    City,
    Location,
    Province,
}

impl DescriptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptionKind::Event => "event",
            DescriptionKind::City => "city",
            DescriptionKind::Location => "location",
            DescriptionKind::Province => "province",
        }
    }

    fn param_key(&self) -> &'static str {
        match self {
            DescriptionKind::Event => EVENT_ID,
            DescriptionKind::City => CITY_ID,
            DescriptionKind::Location => LOCATION_ID,
            DescriptionKind::Province => PROVINCE_ID,
        }
    }
}

impl fmt::Display for DescriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DescriptionKind {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(DescriptionKind::Event),
            "city" => Ok(DescriptionKind::City),
            "location" => Ok(DescriptionKind::Location),
            "province" => Ok(DescriptionKind::Province),
            other => Err(AiError::InvalidInput(format!("cannot describe a {other:?}"))),
        }
    }
}

pub struct AiOrchestrator {
    knowledge: Arc<KnowledgeStore>,
    sessions: Arc<SessionStore>,
    adapters: AdapterManager,
    users: Option<Arc<UserAdapter>>,
    limiter: RateLimiter,
    model: Arc<dyn ModelClient>,
    policies: Arc<PolicyCatalogue>,
    gate: QualityGate,
    model_config: ModelConfig,
}

impl AiOrchestrator {
    /// Orchestrator with no adapters registered. The knowledge store starts
    /// with the configured contextual facts.
    pub fn new(config: &AiConfig, model: Arc<dyn ModelClient>, policies: Arc<PolicyCatalogue>) -> AiResult<Self> {
        let knowledge = Arc::new(KnowledgeStore::new());
        for (key, text) in &config.facts {
            knowledge.set_fact(key, text);
        }
        Ok(Self {
            adapters: AdapterManager::new(Arc::clone(&knowledge)),
            knowledge,
            sessions: Arc::new(SessionStore::new(&config.sessions)),
            users: None,
            limiter: RateLimiter::new(&config.rate_limit)?,
            model,
            policies,
            gate: QualityGate::new(&config.quality),
            model_config: config.model.clone(),
        })
    }

    /// Register the cultural, place and user adapters, in that order, over
    /// the given sources.
    pub fn with_domain_sources(
        mut self,
        config: &AiConfig,
        cultural: Arc<dyn CulturalSource>,
        place: Arc<dyn PlaceSource>,
        user: Arc<dyn UserSource>,
    ) -> AiResult<Self> {
        let limits = &config.adapters;
        let users = Arc::new(UserAdapter::new(user, limits.clone()));
        self.adapters
            .register_adapter(
                "cultural",
                Arc::new(CulturalAdapter::new(cultural, Arc::clone(&place), limits.clone())),
            )?;
        self.adapters
            .register_adapter("place", Arc::new(PlaceAdapter::new(place, limits.clone())))?;
        self.adapters.register_adapter("user", users.clone())?;
        self.users = Some(users);
        Ok(self)
    }

    pub fn register_adapter(&self, name: &str, adapter: Arc<dyn DomainAdapter>) -> AiResult<()> {
        self.adapters.register_adapter(name, adapter)
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn adapters(&self) -> &AdapterManager {
        &self.adapters
    }

    /// Reload every adapter's bounded sample into the knowledge store.
    pub async fn refresh_knowledge(&self) -> LoadReport {
        self.adapters.load_all_data().await
    }

    /// Open a session. The user's profile and badges are pulled into the
    /// knowledge store on first reference; failure to do so is only logged.
    pub async fn create_session(&self, user_id: &str, event_id: Option<&str>) -> AiResult<ChatSession> {
        let session = self.sessions.create_session(user_id, event_id)?;
        if let Some(users) = &self.users {
            if !self.knowledge.contains::<UserRecord>(&session.user_id) {
                if let Err(e) = users.load_user_data(&session.user_id).await {
                    tracing::warn!(
                        target: "cultura::orchestrator",
                        user_id = %session.user_id,
                        error = %e,
                        "user data not loaded"
                    );
                }
            }
        }
        tracing::info!(
            target: "cultura::orchestrator",
            session_id = %session.id,
            user_id = %session.user_id,
            "chat session opened"
        );
        Ok(session)
    }

    pub fn session(&self, session_id: &str) -> AiResult<ChatSession> {
        self.sessions.get_session(session_id)
    }

    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove_session(session_id)
    }

    /// Answer `query` within a session and record the exchange.
    pub async fn generate_response(&self, ctx: &CallContext, session_id: &str, query: &str) -> AiResult<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AiError::InvalidInput("message is empty".to_string()));
        }

        self.limiter.acquire(ctx).await?;
        let session = self.sessions.get_session(session_id)?;

        let context = self.chat_context(&session).await;
        let request = GenerationRequest::new(
            &self.model_config,
            self.policies.compose(CHAT_BLOCKS),
            build_chat_prompt(&context, &session.messages, query),
        );

        let started = Instant::now();
        let reply = self.call_model(ctx, &request).await?;
        self.check_quality(&reply, session_id)?;

        if let Err(e) = self.sessions.append_exchange(
            session_id,
            vec![(ChatRole::User, query.to_string()), (ChatRole::Assistant, reply.clone())],
        ) {
            tracing::warn!(
                target: "cultura::orchestrator",
                session_id,
                error = %e,
                "reply generated but not recorded"
            );
        }
        tracing::debug!(
            target: "cultura::orchestrator",
            session_id,
            model = self.model.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reply generated"
        );
        Ok(reply)
    }

    pub async fn send_message(&self, ctx: &CallContext, session_id: &str, text: &str) -> AiResult<ChatReply> {
        let text = self.generate_response(ctx, session_id, text).await?;
        let lines = display_lines(&text);
        Ok(ChatReply { text, lines })
    }

    /// Standalone description of one entity; no session involved.
    pub async fn generate_description(&self, ctx: &CallContext, kind: DescriptionKind, id: &str) -> AiResult<String> {
        let id = id.trim();
        if uuid::Uuid::parse_str(id).is_err() {
            return Err(AiError::InvalidInput(format!("{kind} id {id:?} is not a UUID")));
        }
        let params = ContextParams::new().with(kind.param_key(), id);
        let context = self.adapters.build_comprehensive_context(&params).await;
        if context.is_empty() {
            return Err(AiError::NotFound(format!("{kind} {id}")));
        }

        self.limiter.acquire(ctx).await?;
        let request = GenerationRequest::new(
            &self.model_config,
            self.policies.compose(DESCRIPTION_BLOCKS),
            format!(
                "Write a short, engaging description of this {kind} for travellers, \
                 using only the facts below.\n\n{context}"
            ),
        );
        let description = self.call_model(ctx, &request).await?;
        self.check_quality(&description, id)?;
        Ok(description)
    }

    async fn chat_context(&self, session: &ChatSession) -> String {
        let narrative = self
            .knowledge
            .build_context(&session.user_id, session.event_id.as_deref());
        let mut params = ContextParams::new();
        if let Some(event_id) = session.event_id.as_deref() {
            params.insert(EVENT_ID, event_id);
        }
        let fragments = if params.is_empty() {
            String::new()
        } else {
            self.adapters.build_comprehensive_context(&params).await
        };
        [narrative, fragments]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    async fn call_model(&self, ctx: &CallContext, request: &GenerationRequest) -> AiResult<String> {
        let timeout = self.model_config.timeout();
        let bounded = ctx.bounded(timeout);
        match bounded.run(self.model.generate(request)).await {
            Ok(Ok(text)) => Ok(clean_reply(&text)),
            Ok(Err(e)) => {
                tracing::error!(
                    target: "cultura::orchestrator",
                    model = self.model.model_name(),
                    error = %e,
                    "model call failed"
                );
                Err(e.into())
            }
            Err(Interrupted::Cancelled) => Err(AiError::ResourceExhausted("request cancelled".to_string())),
            Err(Interrupted::DeadlineExceeded) => {
                tracing::warn!(
                    target: "cultura::orchestrator",
                    model = self.model.model_name(),
                    timeout_secs = timeout.as_secs(),
                    "model call timed out"
                );
                Err(AiError::Internal("model call timed out".to_string()))
            }
        }
    }

    fn check_quality(&self, reply: &str, subject: &str) -> AiResult<()> {
        let report = self.gate.evaluate(reply);
        if report.passed() {
            return Ok(());
        }
        let issues = report.issues.join("; ");
        tracing::warn!(
            target: "cultura::orchestrator",
            subject,
            enforced = self.gate.enforced(),
            issues = %issues,
            "reply failed quality check"
        );
        if self.gate.enforced() {
            Err(AiError::InvalidResponse(issues))
        } else {
            Ok(())
        }
    }
}

/// User turn sent to the model: context first, then the recent transcript,
/// then the new question.
pub fn build_chat_prompt(context: &str, transcript: &[ChatMessage], query: &str) -> String {
    let mut prompt = String::new();
    if !context.trim().is_empty() {
        prompt.push_str("Context:\n");
        prompt.push_str(context.trim());
        prompt.push_str("\n\n");
    }
    let recent = &transcript[transcript.len().saturating_sub(TRANSCRIPT_WINDOW)..];
    if !recent.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in recent {
            let speaker = match message.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
                ChatRole::System => "System",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push('\n');
    }
    prompt.push_str("User question: ");
    prompt.push_str(query);
    prompt
}
