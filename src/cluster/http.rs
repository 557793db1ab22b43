//! HTTP API for the cluster
//!
//! Client submissions, status inspection, and fault injection (crash,
//! recover, election trigger) for an in-process cluster.

use crate::cluster::server::Cluster;
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{NodeId, SubmitOperation, SubmitResult};
use crate::Error;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub type AppState = Arc<Cluster>;

pub fn create_router(cluster: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(cluster_status))
        .route("/submit", post(submit_routed))
        .route("/nodes/:id", get(node_status))
        .route("/nodes/:id/journal", get(node_journal))
        .route("/nodes/:id/balance/:account", get(node_balance))
        .route("/nodes/:id/submit", post(submit_direct))
        .route("/nodes/:id/crash", post(crash_node))
        .route("/nodes/:id/recover", post(recover_node))
        .route("/nodes/:id/election", post(trigger_election))
        .layer(middleware::from_fn(request_tracing_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(cluster)
}

fn error_response(e: Error) -> Response {
    let status = e.to_http_status();
    (
        status,
        Json(json!({ "error": e.to_string(), "known_leader": e.known_leader() })),
    )
        .into_response()
}

/// Rejected submission: `SubmitResult` body, plus a `Location` to the leader on redirects.
fn rejected_submission(e: Error) -> Response {
    let status = e.to_http_status();
    let known_leader = e.known_leader();
    let mut response = (
        status,
        Json(SubmitResult::rejected(known_leader, e.to_string())),
    )
        .into_response();

    if let Some(leader) = known_leader {
        if let Ok(location) = HeaderValue::from_str(&format!("/nodes/{}/submit", leader)) {
            response.headers_mut().insert(header::LOCATION, location);
        }
    }
    response
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

async fn cluster_status(State(cluster): State<AppState>) -> impl IntoResponse {
    Json(cluster.status())
}

async fn node_status(State(cluster): State<AppState>, Path(id): Path<NodeId>) -> Response {
    match cluster.node(id) {
        Ok(node) => Json(node.status()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn node_journal(State(cluster): State<AppState>, Path(id): Path<NodeId>) -> Response {
    match cluster.node(id) {
        Ok(node) => Json(node.journal()).into_response(),
        Err(e) => error_response(e),
    }
}

async fn node_balance(
    State(cluster): State<AppState>,
    Path((id, account)): Path<(NodeId, String)>,
) -> Response {
    match cluster.node(id) {
        Ok(node) => Json(json!({
            "node": id,
            "account_id": account,
            "balance": node.balance(&account),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn submit_routed(
    State(cluster): State<AppState>,
    Json(req): Json<SubmitOperation>,
) -> Response {
    match cluster.submit(req.into()).await {
        Ok(receipt) => Json(SubmitResult::from(receipt)).into_response(),
        Err(e) => rejected_submission(e),
    }
}

async fn submit_direct(
    State(cluster): State<AppState>,
    Path(id): Path<NodeId>,
    Json(req): Json<SubmitOperation>,
) -> Response {
    match cluster.submit_to(id, req.into()) {
        Ok(receipt) => Json(SubmitResult::from(receipt)).into_response(),
        Err(e) => rejected_submission(e),
    }
}

async fn crash_node(State(cluster): State<AppState>, Path(id): Path<NodeId>) -> Response {
    match cluster.crash(id) {
        Ok(()) => Json(json!({ "status": "crashed", "node": id })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn recover_node(State(cluster): State<AppState>, Path(id): Path<NodeId>) -> Response {
    match cluster.recover(id) {
        Ok(()) => Json(json!({ "status": "recovered", "node": id })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn trigger_election(State(cluster): State<AppState>, Path(id): Path<NodeId>) -> Response {
    match cluster.start_election(id) {
        Ok(started) => (
            StatusCode::ACCEPTED,
            Json(json!({ "node": id, "election_started": started })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
