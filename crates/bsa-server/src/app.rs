//! Router, handlers, and service wiring

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use bsa_core::{BsaError, CoreConfig, Proposal, VersionId};
use bsa_patch::PatchEngine;
use bsa_reconcile::{HealthStatus, Reconciler};
use bsa_store::{ProposalQueue, VersionStore};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ProposalQueue>,
    pub store: Arc<VersionStore>,
    pub reconciler: Arc<Reconciler>,
    /// Admission-time patch validation; same format as the reconciler's
    pub patch: Arc<PatchEngine>,
}

/// Fully wired service: shared structures plus the reconciler
pub struct Service {
    pub queue: Arc<ProposalQueue>,
    pub store: Arc<VersionStore>,
    pub reconciler: Arc<Reconciler>,
}

impl Service {
    pub fn new(config: CoreConfig) -> Self {
        let queue = Arc::new(ProposalQueue::new());
        let store = Arc::new(VersionStore::with_history_limit(config.history_limit));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            config,
        ));
        Service {
            queue,
            store,
            reconciler,
        }
    }

    pub fn router(&self) -> Router {
        router(AppState {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            reconciler: Arc::clone(&self.reconciler),
            patch: Arc::new(PatchEngine::new()),
        })
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/propose", post(propose))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StateQuery {
    version: Option<String>,
}

/// GET /api/v1/state
async fn get_state(State(state): State<AppState>, Query(query): Query<StateQuery>) -> Response {
    let version = match query.version.as_deref() {
        None | Some("latest") => None,
        Some(raw) => match raw.parse::<VersionId>() {
            Ok(v) => Some(v),
            Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        },
    };

    match state.store.get(version) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot.as_ref().clone())).into_response(),
        Err(err) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
    }
}

/// POST /api/v1/propose
async fn propose(State(state): State<AppState>, Json(proposal): Json<Proposal>) -> Response {
    if proposal.intent_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "intent_id is required");
    }
    if proposal.delta_patch.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "delta_patch is required");
    }
    if let Err(err) = state.patch.check(&proposal.delta_patch) {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    let intent_id = proposal.intent_id.clone();
    match state.queue.enqueue(proposal) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "accepted", "intent_id": intent_id })),
        )
            .into_response(),
        Err(err @ BsaError::DuplicateIntent(_)) => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

/// GET /health
async fn health(State(state): State<AppState>) -> Response {
    match state.reconciler.health() {
        HealthStatus::Ok => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": state.store.head_version().map(|v| v.to_string()),
            })),
        )
            .into_response(),
        HealthStatus::Degraded {
            consecutive_failures,
        } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "consecutive_failures": consecutive_failures,
            })),
        )
            .into_response(),
    }
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "error": message }))).into_response()
}
