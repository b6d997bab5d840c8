//! HTTP API for the coordinator
//!
//! Request-layer surface:
//! - `POST /records`            write a new record through the coordinator
//! - `PUT  /records/:id`        update a record through the coordinator
//! - `GET  /nodes/:id/records`  read the records one node holds
//! - `GET  /status`             per-node liveness, role and term
//!
//! plus health probes and `POST /admin/elect` to run a coordination round now.

use crate::common::{NodeId, Result};
use crate::coordinator::cluster::{Cluster, ReadOutcome};
use crate::coordinator::registry::NodeStatus;
use crate::coordinator::replication::WriteOutcome;
use crate::node::http::UpdateBody;
use crate::storage::ApplicationRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

/// Shared coordinator state for HTTP handlers.
#[derive(Clone)]
pub struct CoordState {
    pub cluster: Cluster,
}

/// Body of `POST /records`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBody {
    pub payload: serde_json::Value,
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: CoordState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        // Request layer
        .route("/records", post(write_record))
        .route("/records/:id", put(update_record))
        .route("/nodes/:id/records", get(read_node))
        .route("/status", get(status))
        // Admin
        .route("/admin/elect", post(admin_elect))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe: the process answers.
async fn health_live() -> impl IntoResponse {
    Json(json!({
        "alive": true,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// Readiness probe: 200 only while an alive coordinator exists.
async fn health_ready(State(state): State<CoordState>) -> impl IntoResponse {
    match state.cluster.coordinator().await {
        Some(c) => (
            StatusCode::OK,
            Json(json!({
                "ready": true,
                "coordinator_id": c.id,
                "term": c.term,
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "reason": "No coordinator",
            })),
        ),
    }
}

async fn write_record(
    State(state): State<CoordState>,
    Json(body): Json<WriteBody>,
) -> Result<(StatusCode, Json<WriteOutcome>)> {
    let outcome = state.cluster.write(body.payload).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn update_record(
    State(state): State<CoordState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<ApplicationRecord>> {
    Ok(Json(state.cluster.update(id, body.payload).await?))
}

async fn read_node(
    State(state): State<CoordState>,
    Path(id): Path<NodeId>,
) -> Result<Json<ReadOutcome>> {
    Ok(Json(state.cluster.read(id).await?))
}

async fn status(State(state): State<CoordState>) -> Json<Vec<NodeStatus>> {
    Json(state.cluster.status().await)
}

/// Wake the coordination loop for an immediate round.
async fn admin_elect(State(state): State<CoordState>) -> impl IntoResponse {
    state.cluster.trigger();
    (StatusCode::ACCEPTED, Json(json!({ "status": "round triggered" })))
}
