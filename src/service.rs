use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::info;

use crate::advisor::{Advisor, Recommendation};
use crate::audit::AuditRecord;
use crate::context::TriggerEvent;
use crate::dispatch::TriggerDispatcher;
use crate::error::EngineError;
use crate::rule::Rule;
use crate::store::{DeadLetter, RuleStore, StoredRule};
use crate::trigger::TriggerKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    pub rule: Rule,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResponse {
    pub version: u32,
    pub rule: Rule,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_by: Option<String>,
}

impl From<StoredRule> for RuleResponse {
    fn from(value: StoredRule) -> Self {
        Self {
            version: value.version,
            rule: value.rule,
            created_at: value.created_at,
            updated_by: value.updated_by,
        }
    }
}

/// Trigger invocation contract: the entity-store write path or the external
/// scheduler posts the event class and payload after the state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub kind: TriggerKind,
    pub event: TriggerEvent,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

#[derive(Clone)]
struct EngineState {
    store: RuleStore,
    dispatcher: Arc<TriggerDispatcher>,
    advisor: Arc<Advisor>,
}

/// Configuration for the engine API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8085".to_string()
}

impl Default for EngineServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Helper used by services to compose the REST API router.
#[derive(Clone)]
pub struct EngineApiBuilder {
    state: EngineState,
}

impl EngineApiBuilder {
    pub fn new(store: RuleStore, dispatcher: Arc<TriggerDispatcher>, advisor: Arc<Advisor>) -> Self {
        Self {
            state: EngineState {
                store,
                dispatcher,
                advisor,
            },
        }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/scopes", get(list_scopes))
            .route("/scopes/:scope/rules", get(list_rules).post(upsert_rule))
            .route(
                "/scopes/:scope/rules/:rule_id",
                get(get_rule).put(disable_rule),
            )
            .route("/scopes/:scope/dead-letter", get(list_dead_letters))
            .route("/scopes/:scope/trigger", post(fire_trigger))
            .route("/entities/:entity_id/recommendations", get(pull_recommendations))
            .route(
                "/entities/:entity_id/recommendations/:index",
                post(promote_recommendation),
            )
            .with_state(self.state)
    }

    /// Spawns an HTTP server binding to the configured address.
    pub async fn serve(self, config: EngineServiceConfig) -> anyhow::Result<oneshot::Sender<()>> {
        let (tx, rx) = oneshot::channel();
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        let state = self.state.clone();

        tokio::spawn(async move {
            info!(address = %config.bind_address, "starting rule engine service");
            let app = EngineApiBuilder { state }.into_router();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .ok();
        });

        Ok(tx)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_scopes(State(state): State<EngineState>) -> impl IntoResponse {
    Json(state.store.scopes())
}

async fn list_rules(
    State(state): State<EngineState>,
    Path(scope): Path<String>,
) -> impl IntoResponse {
    let response: Vec<RuleResponse> = state
        .store
        .list_rules(&scope)
        .into_iter()
        .map(RuleResponse::from)
        .collect();
    Json(response)
}

async fn get_rule(
    State(state): State<EngineState>,
    Path((scope, rule_id)): Path<(String, String)>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .latest_rule(&scope, &rule_id)
        .map(RuleResponse::from)
        .map(Json)
        .ok_or_else(|| not_found(&rule_id))
}

async fn upsert_rule(
    State(state): State<EngineState>,
    Path(scope): Path<String>,
    Json(payload): Json<RuleDocument>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .put_rule(&scope, payload.rule, payload.updated_by)
        .map(RuleResponse::from)
        .map(Json)
        .map_err(bad_request)
}

#[derive(Debug, Deserialize)]
struct DisableRequest {
    #[serde(default)]
    updated_by: Option<String>,
}

async fn disable_rule(
    State(state): State<EngineState>,
    Path((scope, rule_id)): Path<(String, String)>,
    Json(payload): Json<DisableRequest>,
) -> Result<Json<RuleResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .disable_rule(&scope, &rule_id, payload.updated_by)
        .map(RuleResponse::from)
        .map(Json)
        .map_err(|_| not_found(&rule_id))
}

async fn list_dead_letters(
    State(state): State<EngineState>,
    Path(scope): Path<String>,
) -> Json<Vec<DeadLetter>> {
    Json(state.store.dead_letters(&scope))
}

async fn fire_trigger(
    State(state): State<EngineState>,
    Path(scope): Path<String>,
    Json(payload): Json<TriggerRequest>,
) -> Json<Vec<AuditRecord>> {
    let records = state
        .dispatcher
        .on_trigger(&scope, payload.kind, &payload.event)
        .await;
    Json(records)
}

async fn pull_recommendations(
    State(state): State<EngineState>,
    Path(entity_id): Path<String>,
) -> Result<Json<Vec<Recommendation>>, (StatusCode, Json<ErrorResponse>)> {
    state
        .advisor
        .recommendations(&entity_id)
        .await
        .map(Json)
        .map_err(engine_error)
}

async fn promote_recommendation(
    State(state): State<EngineState>,
    Path((entity_id, index)): Path<(String, usize)>,
) -> Result<Json<AuditRecord>, (StatusCode, Json<ErrorResponse>)> {
    state
        .advisor
        .promote(&entity_id, index)
        .await
        .map(Json)
        .map_err(engine_error)
}

fn engine_error(err: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        EngineError::EntityNotFound(_) | EngineError::RuleNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        EngineError::RecommendationNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        EngineError::InvalidRule { .. } => (StatusCode::BAD_REQUEST, "invalid_rule"),
        _ => (StatusCode::BAD_GATEWAY, "upstream_failure"),
    };
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
        }),
    )
}

fn bad_request(err: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            code: "invalid_rule".into(),
            message: err.to_string(),
        }),
    )
}

fn not_found(id: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            code: "not_found".into(),
            message: format!("rule {} not found", id),
        }),
    )
}
