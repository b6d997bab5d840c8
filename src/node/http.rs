//! HTTP API of a storage node

use crate::common::Result;
use crate::storage::{ApplicationRecord, NodeStore};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

/// Body of `GET /term` and `PUT /term`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TermBody {
    pub term: u64,
}

/// Body of `PUT /records/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBody {
    pub payload: serde_json::Value,
}

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<dyn NodeStore>,
    pub node_name: String,
}

/// Upper bound for request bodies; a full-state transfer ships every record at once.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Creates the node router.
pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/term", get(get_term).put(set_term))
        .route(
            "/records",
            get(list_records).post(insert_record).delete(delete_all_records),
        )
        .route("/records/bulk", post(insert_records))
        .route("/records/:id", put(update_record))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<NodeState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "node": state.node_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_term(State(state): State<NodeState>) -> Result<Json<TermBody>> {
    let term = state.store.get_term().await?;
    Ok(Json(TermBody { term }))
}

async fn set_term(
    State(state): State<NodeState>,
    Json(body): Json<TermBody>,
) -> Result<StatusCode> {
    state.store.set_term(body.term).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_records(State(state): State<NodeState>) -> Result<Json<Vec<ApplicationRecord>>> {
    Ok(Json(state.store.list_records().await?))
}

async fn delete_all_records(State(state): State<NodeState>) -> Result<StatusCode> {
    state.store.delete_all_records().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn insert_records(
    State(state): State<NodeState>,
    Json(records): Json<Vec<ApplicationRecord>>,
) -> Result<StatusCode> {
    tracing::debug!("Bulk insert of {} records", records.len());
    state.store.insert_records(records).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn insert_record(
    State(state): State<NodeState>,
    Json(record): Json<ApplicationRecord>,
) -> Result<(StatusCode, Json<ApplicationRecord>)> {
    let record = state.store.insert_record(record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<NodeState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<ApplicationRecord>> {
    Ok(Json(state.store.update_record(id, body.payload).await?))
}
