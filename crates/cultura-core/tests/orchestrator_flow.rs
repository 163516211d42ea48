//! End-to-end chat flow over a seed catalogue and a scripted model.

use cultura_core::config::AiConfig;
use cultura_core::policy::PolicyBlock;
use cultura_core::{
    AiOrchestrator, CallContext, ChatRole, DescriptionKind, GenerationRequest, ModelClient,
    ModelError, PolicyCatalogue, SeedCatalog,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const USER: &str = "e5f6a7b8-1c2d-4e3f-9a0b-1c2d3e4f5a05";
const EVENT: &str = "4b1f3a6e-9c57-4c1e-8a34-0e5d8f3b2a01";
const CITY: &str = "1a9e7c55-3d2b-4e6f-8c1a-9b0d2e3f4c03";

const SEED: &str = r#"{
    "users": [{"id": "e5f6a7b8-1c2d-4e3f-9a0b-1c2d3e4f5a05", "username": "ayu", "display_name": "Ayu"}],
    "profiles": [{"user_id": "e5f6a7b8-1c2d-4e3f-9a0b-1c2d3e4f5a05", "interests": ["dance"]}],
    "badges": [{"id": "f0e1d2c3-b4a5-4968-8776-5a4b3c2d1e06", "name": "Culture Buff"}],
    "badge_assignments": [{"id": "a1", "user_id": "e5f6a7b8-1c2d-4e3f-9a0b-1c2d3e4f5a05", "badge_id": "f0e1d2c3-b4a5-4968-8776-5a4b3c2d1e06"}],
    "events": [{
        "id": "4b1f3a6e-9c57-4c1e-8a34-0e5d8f3b2a01",
        "title": "Legong Dance",
        "category": "dance",
        "location_id": "7d2c9e10-51aa-4f0b-9b7e-2f0c6d1e4b02",
        "interest_count": 12
    }],
    "stories": [{"id": "s1", "event_id": "4b1f3a6e-9c57-4c1e-8a34-0e5d8f3b2a01", "title": "Origins", "body": "Court dance of Bali."}],
    "provinces": [{"id": "c3e8b1d2-7f4a-4c9e-a1b2-5d6e7f8a9b04", "name": "Bali"}],
    "cities": [{"id": "1a9e7c55-3d2b-4e6f-8c1a-9b0d2e3f4c03", "name": "Ubud", "province_id": "c3e8b1d2-7f4a-4c9e-a1b2-5d6e7f8a9b04"}],
    "locations": [{"id": "7d2c9e10-51aa-4f0b-9b7e-2f0c6d1e4b02", "name": "Ubud Palace", "city_id": "1a9e7c55-3d2b-4e6f-8c1a-9b0d2e3f4c03"}]
}"#;

/// Model double: fixed reply (or failure) after an optional delay; records
/// every request and when it arrived.
struct ScriptedModel {
    reply: String,
    fail: bool,
    delay: Duration,
    calls: Mutex<Vec<(Instant, GenerationRequest)>>,
}

impl ScriptedModel {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            fail: false,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: String::new(),
            fail: true,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: "Eventually.".to_string(),
            fail: false,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(Instant, GenerationRequest)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push((Instant::now(), request.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ModelError::Status { status: 503, body: "upstream overloaded".into() });
        }
        Ok(self.reply.clone())
    }
}

fn orchestrator_with(config: AiConfig, model: Arc<ScriptedModel>) -> AiOrchestrator {
    let seed = Arc::new(SeedCatalog::from_json_str(SEED).unwrap());
    AiOrchestrator::new(&config, model, Arc::new(PolicyCatalogue::default()))
        .unwrap()
        .with_domain_sources(&config, seed.clone(), seed.clone(), seed)
        .unwrap()
}

fn ctx() -> CallContext {
    CallContext::with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn chat_turn_is_grounded_and_recorded() {
    let model = ScriptedModel::replying("the **Legong** starts at 7pm.\n\n## Tips\nArrive early");
    let ai = orchestrator_with(AiConfig::default(), model.clone());
    let report = ai.refresh_knowledge().await;
    assert!(report.is_complete(), "{report:?}");

    let session = ai.create_session(USER, Some(EVENT)).await.unwrap();
    let reply = ai.send_message(&ctx(), &session.id, "When does it start?").await.unwrap();

    assert!(reply.text.starts_with("The **Legong**"));
    assert_eq!(reply.lines, vec!["The Legong starts at 7pm.", "Tips", "Arrive early"]);

    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    let request = &calls[0].1;
    let catalogue = PolicyCatalogue::default();
    assert!(request.system_instruction.starts_with(catalogue.text(PolicyBlock::SystemScope)));
    assert!(request.system_instruction.ends_with(catalogue.text(PolicyBlock::Fallback)));
    assert!(request.prompt.starts_with("Context:\nUser: Ayu (@ayu)"));
    assert!(request.prompt.contains("Badges earned: Culture Buff"));
    assert!(request.prompt.contains("Where: Ubud Palace, Ubud, Bali"));
    assert!(request.prompt.contains("- Origins: Court dance of Bali."));
    assert!(request.prompt.ends_with("User question: When does it start?"));
    assert_eq!(request.top_k, AiConfig::default().model.top_k);

    let transcript = ai.session(&session.id).unwrap().messages;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, ChatRole::User);
    assert_eq!(transcript[0].content, "When does it start?");
    assert_eq!(transcript[1].role, ChatRole::Assistant);
    assert_eq!(transcript[1].content, reply.text);
}

#[tokio::test]
async fn second_turn_replays_the_transcript() {
    let model = ScriptedModel::replying("Sure.");
    let ai = orchestrator_with(AiConfig::default(), model.clone());
    let session = ai.create_session("u1", None).await.unwrap();

    ai.generate_response(&ctx(), &session.id, "hello").await.unwrap();
    ai.generate_response(&ctx(), &session.id, "and again").await.unwrap();

    let prompt = &model.calls()[1].1.prompt;
    assert!(prompt.contains("Conversation so far:\nUser: hello\nAssistant: Sure.\n"));
    assert_eq!(ai.session(&session.id).unwrap().messages.len(), 4);
}

#[tokio::test]
async fn model_failure_is_internal_and_leaves_transcript_alone() {
    let ai = orchestrator_with(AiConfig::default(), ScriptedModel::failing());
    let session = ai.create_session("u1", None).await.unwrap();

    let err = ai.generate_response(&ctx(), &session.id, "hello").await.unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert!(!err.is_retryable());
    assert!(!err.public_message().contains("overloaded"));
    assert!(ai.session(&session.id).unwrap().messages.is_empty());
}

#[tokio::test]
async fn cancelled_call_does_not_mutate_the_session() {
    let ai = Arc::new(orchestrator_with(AiConfig::default(), ScriptedModel::slow(Duration::from_secs(30))));
    let session = ai.create_session("u1", None).await.unwrap();

    let ctx = ctx();
    let canceller = ctx.token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = ai.generate_response(&ctx, &session.id, "hello").await.unwrap_err();
    assert_eq!(err.code(), "RESOURCE_EXHAUSTED");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(ai.session(&session.id).unwrap().messages.is_empty());
}

#[tokio::test]
async fn slow_model_hits_the_call_deadline() {
    let ai = orchestrator_with(AiConfig::default(), ScriptedModel::slow(Duration::from_secs(30)));
    let session = ai.create_session("u1", None).await.unwrap();

    let ctx = CallContext::with_timeout(Duration::from_millis(100));
    let err = ai.generate_response(&ctx, &session.id, "hello").await.unwrap_err();
    assert_eq!(err.code(), "INTERNAL");
    assert!(ai.session(&session.id).unwrap().messages.is_empty());
}

#[tokio::test]
async fn second_back_to_back_call_waits_for_a_token() {
    let mut config = AiConfig::default();
    config.rate_limit.burst = 1;
    config.rate_limit.refill_interval_ms = 1000;
    let model = ScriptedModel::replying("Ok.");
    let ai = orchestrator_with(config, model.clone());
    let session = ai.create_session("u1", None).await.unwrap();

    let started = Instant::now();
    ai.generate_response(&ctx(), &session.id, "first").await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    ai.generate_response(&ctx(), &session.id, "second").await.unwrap();

    let calls = model.calls();
    let gap = calls[1].0.duration_since(calls[0].0);
    assert!(gap >= Duration::from_millis(900), "second call fired after {gap:?}");
}

#[tokio::test]
async fn enforced_quality_gate_rejects_and_advisory_gate_delivers() {
    let long_reply = "Ubud is lovely. ".repeat(20);

    let mut strict = AiConfig::default();
    strict.quality.max_chars = 50;
    strict.quality.enforce = true;
    let ai = orchestrator_with(strict, ScriptedModel::replying(&long_reply));
    let session = ai.create_session("u1", None).await.unwrap();
    let err = ai.generate_response(&ctx(), &session.id, "Tell me about Ubud").await.unwrap_err();
    assert_eq!(err.code(), "INVALID_RESPONSE");
    assert!(ai.session(&session.id).unwrap().messages.is_empty());

    let mut advisory = AiConfig::default();
    advisory.quality.max_chars = 50;
    let ai = orchestrator_with(advisory, ScriptedModel::replying(&long_reply));
    let session = ai.create_session("u1", None).await.unwrap();
    let reply = ai.generate_response(&ctx(), &session.id, "Tell me about Ubud").await.unwrap();
    assert_eq!(reply, long_reply.trim());
}

#[tokio::test]
async fn session_errors_propagate() {
    let ai = orchestrator_with(AiConfig::default(), ScriptedModel::replying("Hi."));
    let err = ai.generate_response(&ctx(), "sess-nope", "hello").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let session = ai.create_session("u1", None).await.unwrap();
    let err = ai.generate_response(&ctx(), &session.id, "   ").await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn session_cap_applies_through_the_orchestrator() {
    let mut config = AiConfig::default();
    config.sessions.max_sessions = 1;
    let ai = orchestrator_with(config, ScriptedModel::replying("Hi."));
    ai.create_session("u1", None).await.unwrap();
    let err = ai.create_session("u2", None).await.unwrap_err();
    assert_eq!(err.code(), "RESOURCE_EXHAUSTED");
    assert_eq!(ai.sessions().len(), 1);
}

#[tokio::test]
async fn creating_a_session_pulls_the_user_into_the_store() {
    let ai = orchestrator_with(AiConfig::default(), ScriptedModel::replying("Hi."));
    ai.create_session(USER, None).await.unwrap();
    assert_eq!(ai.knowledge().badges_for_user(USER)[0].name, "Culture Buff");
}

#[tokio::test]
async fn description_uses_place_context() {
    let model = ScriptedModel::replying("ubud is the cultural heart of Bali.");
    let ai = orchestrator_with(AiConfig::default(), model.clone());

    let text = ai.generate_description(&ctx(), DescriptionKind::City, CITY).await.unwrap();
    assert_eq!(text, "Ubud is the cultural heart of Bali.");

    let request = &model.calls()[0].1;
    assert!(request.prompt.contains("City: Ubud, Bali"));
    assert!(request.prompt.contains("Places in Ubud: Ubud Palace"));
    assert!(!request.system_instruction.contains(PolicyCatalogue::default().text(PolicyBlock::Examples)));
}

#[tokio::test]
async fn description_rejects_bad_and_unknown_ids() {
    let model = ScriptedModel::replying("x");
    let ai = orchestrator_with(AiConfig::default(), model.clone());

    let err = ai.generate_description(&ctx(), DescriptionKind::Event, "legong").await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    let err = ai
        .generate_description(&ctx(), DescriptionKind::Province, "00000000-0000-4000-8000-000000000000")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn event_description_reads_the_venue_through_when_places_were_not_loaded() {
    let mut config = AiConfig::default();
    config.adapters.provinces = 0;
    let model = ScriptedModel::replying("A classical dance.");
    let ai = orchestrator_with(config, model.clone());
    let report = ai.refresh_knowledge().await;
    assert!(report.is_complete(), "{report:?}");

    ai.generate_description(&ctx(), DescriptionKind::Event, EVENT).await.unwrap();

    let prompt = &model.calls()[0].1.prompt;
    assert!(prompt.contains("Event: Legong Dance"));
    assert!(prompt.contains("Where: Ubud Palace, Ubud, Bali"), "{prompt}");
}

#[tokio::test]
async fn configured_facts_reach_the_chat_prompt() {
    let mut config = AiConfig::default();
    config
        .facts
        .insert("product".to_string(), "Cultura is a guide to Balinese culture.".to_string());
    let model = ScriptedModel::replying("Welcome.");
    let ai = orchestrator_with(config, model.clone());

    let session = ai.create_session("u1", None).await.unwrap();
    ai.send_message(&ctx(), &session.id, "What is this app?").await.unwrap();

    let prompt = &model.calls()[0].1.prompt;
    assert!(
        prompt.contains("Additional context:\n- product: Cultura is a guide to Balinese culture."),
        "{prompt}"
    );
}
