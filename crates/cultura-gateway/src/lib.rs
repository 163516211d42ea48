//! Cultura gateway: thin HTTP surface over [`AiOrchestrator`].
//!
//! Every error body is `{"code": ..., "message": ...}`; internal detail only
//! reaches the logs.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use cultura_core::{
    AiConfig, AiError, AiOrchestrator, CallContext, ChatSession, DescriptionKind, LoadReport,
    ModelClient, OpenRouterClient, PolicyCatalogue, SeedCatalog, UnconfiguredModel,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct AppState {
    pub orchestrator: Arc<AiOrchestrator>,
    pub request_timeout: Duration,
}

impl AppState {
    fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}

/// `AiError` as an HTTP response.
pub struct ApiError(pub AiError);

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AiError::InvalidInput(rejection.body_text()))
    }
}

pub fn status_for(err: &AiError) -> StatusCode {
    match err {
        AiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AiError::NotFound(_) => StatusCode::NOT_FOUND,
        AiError::SessionExpired(_) => StatusCode::GONE,
        AiError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        AiError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        AiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if let AiError::Internal(detail) = &err {
            tracing::error!(target: "cultura::gateway", detail = %detail, "request failed");
        }
        let body = ErrorBody {
            code: err.code().to_string(),
            message: err.public_message(),
        };
        (status_for(&err), Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub reply: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DescribeRequest {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub description: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ai/sessions", post(create_session))
        .route("/api/v1/ai/sessions/:id", get(get_session))
        .route("/api/v1/ai/sessions/:id/messages", post(send_message))
        .route("/api/v1/ai/describe", post(describe))
        .route("/api/v1/ai/knowledge/reload", post(reload_knowledge))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let Json(req) = body?;
    let session = state
        .orchestrator
        .create_session(&req.user_id, req.event_id.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            created_at: session.created_at,
        }),
    ))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, ApiError> {
    Ok(Json(state.orchestrator.session(&id)?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(req) = body?;
    let ctx = state.call_context();
    let reply = state.orchestrator.send_message(&ctx, &id, &req.message).await?;
    Ok(Json(SendMessageResponse {
        reply: reply.text,
        lines: reply.lines,
    }))
}

async fn describe(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DescribeRequest>, JsonRejection>,
) -> Result<Json<DescribeResponse>, ApiError> {
    let Json(req) = body?;
    let kind: DescriptionKind = req.kind.parse()?;
    let ctx = state.call_context();
    let description = state.orchestrator.generate_description(&ctx, kind, &req.id).await?;
    Ok(Json(DescribeResponse { description }))
}

async fn reload_knowledge(State(state): State<Arc<AppState>>) -> Json<LoadReport> {
    Json(state.orchestrator.refresh_knowledge().await)
}

/// Upstream model from config; a stand-in that always fails when no API key
/// is configured, so the rest of the surface still serves.
pub fn model_from_config(config: &AiConfig) -> Arc<dyn ModelClient> {
    match OpenRouterClient::new(&config.model) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(target: "cultura::gateway", error = %e, "model unavailable; AI replies will fail");
            Arc::new(UnconfiguredModel)
        }
    }
}

/// Wire the orchestrator: policies, seed catalogue, model, adapters. Runs
/// one knowledge load before returning.
pub async fn build_orchestrator(
    config: &AiConfig,
    model: Arc<dyn ModelClient>,
) -> Result<AiOrchestrator, BoxError> {
    let policies = match config.gateway.policy_path.as_deref() {
        Some(path) => PolicyCatalogue::from_file(FsPath::new(path))?,
        None => PolicyCatalogue::default(),
    };
    let seed = match config.gateway.seed_path.as_deref() {
        Some(path) => SeedCatalog::from_path(path).await?,
        None => {
            tracing::warn!(target: "cultura::gateway", "no seed_path configured; domain sources are empty");
            SeedCatalog::default()
        }
    };
    let seed = Arc::new(seed);

    let orchestrator = AiOrchestrator::new(config, model, Arc::new(policies))?.with_domain_sources(
        config,
        seed.clone(),
        seed.clone(),
        seed,
    )?;
    let report = orchestrator.refresh_knowledge().await;
    tracing::info!(
        target: "cultura::gateway",
        loaded = ?report.succeeded,
        failed = report.failed.len(),
        entities = orchestrator.knowledge().len(),
        facts = config.facts.len(),
        "initial knowledge load"
    );
    Ok(orchestrator)
}
