//! Per-request logging for the cluster HTTP API
//!
//! Every request runs inside an `api_request` span carrying its request id,
//! the matched route and, for `/nodes/{id}/...` routes, the addressed node.
//! Completion is logged by outcome: leader redirects name the leader they
//! point at, rejections and server errors are warnings, status polling stays
//! at debug.

use crate::common::NodeId;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, HeaderValue, Method, Request, Response, StatusCode},
    middleware::Next,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Node addressed by a `/nodes/{id}/...` path.
pub fn target_node(path: &str) -> Option<NodeId> {
    let mut segments = path.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("nodes"), Some(id)) => id.parse().ok(),
        _ => None,
    }
}

/// Tags each request with an id (reusing the caller's if present), runs it
/// in a span scoped to the route and target node, and logs the outcome.
pub async fn request_tracing_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let span = tracing::info_span!(
        "api_request",
        request_id = %request_id,
        method = %method,
        route = %route,
        node = ?target_node(&path),
    );

    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    span.in_scope(|| {
        if status == StatusCode::TEMPORARY_REDIRECT {
            let leader = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(target_node);
            tracing::info!(status = status.as_u16(), elapsed_ms, ?leader, "redirected to leader");
        } else if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), elapsed_ms, "request failed");
        } else if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), elapsed_ms, "request rejected");
        } else if method == Method::GET {
            tracing::debug!(status = status.as_u16(), elapsed_ms, "request completed");
        } else {
            tracing::info!(status = status.as_u16(), elapsed_ms, "request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
