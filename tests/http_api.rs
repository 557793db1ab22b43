//! HTTP surface of the cluster: router handlers and the reqwest client

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use minibank::cluster::http::create_router;
use minibank::common::{NodeId, SubmitResult};
use minibank::{Cluster, ClusterClient, ClusterConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SETTLE: Duration = Duration::from_secs(3);

async fn settled_cluster(ids: impl IntoIterator<Item = NodeId>) -> Arc<Cluster> {
    let config = ClusterConfig::with_members(ids).with_heartbeat_interval_ms(20);
    let cluster = Arc::new(Cluster::start(config).unwrap());
    cluster.wait_for_leader(SETTLE).await.unwrap();
    cluster
}

async fn call(
    cluster: &Arc<Cluster>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = create_router(cluster.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

#[tokio::test]
async fn test_health_carries_request_id() {
    let cluster = settled_cluster([1]).await;
    let (status, headers, json) = call(&cluster, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(headers.contains_key("x-request-id"));
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_status_lists_every_node() {
    let cluster = settled_cluster([1, 2, 3]).await;
    let (status, _, json) = call(&cluster, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["leader"], 3);
    assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(json["nodes"][2]["role"], "leader");
    assert_eq!(json["nodes"][0]["role"], "follower");
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_routed_submit_accepted() {
    let cluster = settled_cluster([1, 2, 3]).await;
    let body = serde_json::json!({ "account_id": "A", "delta": 200 });
    let (status, _, json) = call(&cluster, "POST", "/submit", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let result: SubmitResult = serde_json::from_value(json).unwrap();
    assert!(result.accepted);
    assert_eq!(result.known_leader, Some(3));
    assert_eq!(result.balance, Some(200));
    assert!(result.applied_order_key.is_some());

    let (_, _, balance) = call(&cluster, "GET", "/nodes/3/balance/A", None).await;
    assert_eq!(balance["balance"], 200);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_direct_submit_to_follower_redirects() {
    let cluster = settled_cluster([1, 2, 3]).await;
    let body = serde_json::json!({ "account_id": "A", "delta": 5 });
    let (status, headers, json) = call(&cluster, "POST", "/nodes/1/submit", Some(body)).await;

    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/nodes/3/submit");
    assert_eq!(json["accepted"], false);
    assert_eq!(json["known_leader"], 3);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_invalid_submission_is_bad_request() {
    let cluster = settled_cluster([1, 2]).await;
    let body = serde_json::json!({ "account_id": "  ", "delta": 5 });
    let (status, _, json) = call(&cluster, "POST", "/nodes/2/submit", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["accepted"], false);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let cluster = settled_cluster([1, 2]).await;
    let (status, _, json) = call(&cluster, "GET", "/nodes/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("42"));
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_crash_recover_and_election_endpoints() {
    let cluster = settled_cluster([1, 2, 3]).await;

    let (status, _, json) = call(&cluster, "POST", "/nodes/3/crash", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "crashed");
    assert!(!cluster.node(3).unwrap().is_alive());

    let (status, _, _) = call(&cluster, "POST", "/nodes/3/election", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(cluster.wait_for_leader(SETTLE).await.unwrap(), 2);

    let (status, _, json) = call(&cluster, "POST", "/nodes/3/recover", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "recovered");

    let (status, _, json) = call(&cluster, "POST", "/nodes/1/election", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["node"], 1);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_journal_endpoint() {
    let cluster = settled_cluster([1, 2]).await;
    cluster.submit_to(2, minibank::Operation::new("J", 9)).unwrap();

    let (status, _, json) = call(&cluster, "GET", "/nodes/2/journal", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["account_id"], "J");
    assert_eq!(entries[0]["delta"], 9);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_client_follows_leader_redirect() {
    let cluster = settled_cluster([1, 2, 3]).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(cluster.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = ClusterClient::new(format!("http://{}", addr)).unwrap();

    let status = client.status().await.unwrap();
    assert_eq!(status.leader, Some(3));

    let result = client.submit(Some(1), "R", 30).await.unwrap();
    assert!(result.accepted);
    assert_eq!(result.known_leader, Some(3));

    let node = client.node_status(3).await.unwrap();
    assert_eq!(node.ledger.get("R"), Some(&30));

    client.crash(1).await.unwrap();
    assert!(!cluster.node(1).unwrap().is_alive());
    assert!(client.node_status(99).await.is_err());

    cluster.shutdown().await;
}
