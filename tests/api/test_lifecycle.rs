// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Service endpoint lifecycle: bind, ready, drain and stop

use crate::common::{
    get_json, post_json, spawn_endpoint, state_with, StubEmbedder, TestConfig,
};
use axum::http::StatusCode;
use fabstir_embedding_server::{
    api::{create_app, LifecycleState, ServerError, ServiceEndpoint, ShutdownTrigger},
    client::{ClientError, EmbeddingClient},
    version,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_bind_leaves_lifecycle_initializing() {
    let state = state_with(Arc::new(StubEmbedder::new()), TestConfig::default());
    let endpoint = ServiceEndpoint::bind("127.0.0.1:0", state, Duration::from_secs(1))
        .await
        .unwrap();

    assert_ne!(endpoint.local_addr().port(), 0);
    assert_eq!(endpoint.lifecycle().state(), LifecycleState::Initializing);
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap().to_string();

    let state = state_with(Arc::new(StubEmbedder::new()), TestConfig::default());
    let lifecycle = state.lifecycle.clone();
    let result = ServiceEndpoint::bind(&addr, state, Duration::from_secs(1)).await;

    assert!(matches!(result, Err(ServerError::Bind { .. })));
    assert_eq!(lifecycle.state(), LifecycleState::Initializing);
}

#[tokio::test]
async fn test_serves_embeddings_over_http() {
    let state = state_with(
        Arc::new(StubEmbedder::new().with_delay("cat", Duration::from_millis(80))),
        TestConfig::default(),
    );
    let endpoint = spawn_endpoint(state, Duration::from_secs(1)).await;
    let client = EmbeddingClient::new(&endpoint.url()).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.state, "ready");
    assert_eq!(health.dimensions, 3);
    assert_eq!(health.version, version::VERSION_NUMBER);

    let single = client.get_embedding("Hello").await.unwrap();
    assert_eq!(single, vec![5.0, 72.0, 0.0]);

    let batch = client
        .get_embedding_batch(&["cat".to_string(), "dog".to_string(), "bird".to_string()])
        .await
        .unwrap();
    assert_eq!(
        batch,
        vec![vec![3.0, 99.0, 0.0], vec![3.0, 100.0, 0.0], vec![4.0, 98.0, 0.0]]
    );

    let err = client.get_embedding("").await.unwrap_err();
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body.error_type, "invalid_argument");
            assert!(!body.retryable);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let report = endpoint.stop(ShutdownTrigger::Signal).await.unwrap();
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_drain_completes_in_flight_requests() {
    let state = state_with(
        Arc::new(StubEmbedder::new().with_delay("slow", Duration::from_millis(300))),
        TestConfig::default(),
    );
    let endpoint = spawn_endpoint(state, Duration::from_secs(5)).await;
    let client = EmbeddingClient::new(&endpoint.url()).unwrap();
    let lifecycle = endpoint.lifecycle.clone();

    let in_flight = tokio::spawn({
        let client = client.clone();
        async move { client.get_embedding("slow").await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = endpoint.stop(ShutdownTrigger::Signal).await.unwrap();

    assert!(report.drained);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    assert_eq!(in_flight.await.unwrap().unwrap(), vec![4.0, 115.0, 0.0]);

    // Nothing is listening once stopped
    assert!(client.get_embedding("cat").await.is_err());
}

#[tokio::test]
async fn test_grace_period_expiry_exits_non_zero() {
    let state = state_with(
        Arc::new(StubEmbedder::new().with_delay("stuck", Duration::from_secs(2))),
        TestConfig::default(),
    );
    let endpoint = spawn_endpoint(state, Duration::from_millis(100)).await;
    let client = EmbeddingClient::new(&endpoint.url()).unwrap();

    let _stuck = tokio::spawn(async move { client.get_embedding("stuck").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = endpoint.stop(ShutdownTrigger::Signal).await.unwrap();
    assert!(!report.drained);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_embedder_crash_exits_non_zero() {
    let state = state_with(Arc::new(StubEmbedder::new()), TestConfig::default());
    let endpoint = spawn_endpoint(state, Duration::from_secs(1)).await;
    let lifecycle = endpoint.lifecycle.clone();

    let report = endpoint.stop(ShutdownTrigger::EmbedderCrashed).await.unwrap();

    assert_eq!(report.trigger, ShutdownTrigger::EmbedderCrashed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(lifecycle.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_embedding_routes_unavailable_unless_ready() {
    let stub = Arc::new(StubEmbedder::new());
    let state = state_with(stub.clone(), TestConfig::default());
    let lifecycle = state.lifecycle.clone();
    let app = create_app(state);

    // Initializing
    let (status, body) = post_json(app.clone(), "/v1/embedding", json!({ "prompt": "cat" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorType"], "unavailable");
    assert_eq!(body["retryable"], true);

    lifecycle.transition(LifecycleState::Ready).unwrap();
    let (status, _) = post_json(app.clone(), "/v1/embedding", json!({ "prompt": "cat" })).await;
    assert_eq!(status, StatusCode::OK);

    lifecycle.transition(LifecycleState::Draining).unwrap();
    let (status, body) = post_json(
        app.clone(),
        "/v1/embedding/batch",
        json!({ "prompts": ["cat"] }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorType"], "unavailable");
    assert_eq!(stub.calls(), 1);

    // Health stays reachable while draining
    let (status, health) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["state"], "draining");
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_models_endpoint_lists_loaded_model() {
    let state = state_with(Arc::new(StubEmbedder::new()), TestConfig::default());
    let app = create_app(state);

    let (status, body) = get_json(app, "/v1/models").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][0]["name"], "stub");
    assert_eq!(body["models"][0]["dimensions"], 3);
}
