// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Concurrency bounds, timeouts and cancellation

use crate::common::{post_json, ready_app, state_with, StubEmbedder, TestConfig};
use axum::http::StatusCode;
use fabstir_embedding_server::api::LifecycleState;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_one_more_than_max_concurrent_requests_all_succeed() {
    let stub = Arc::new(StubEmbedder::new().with_default_delay(Duration::from_millis(150)));
    let config = TestConfig {
        max_concurrent_requests: 2,
        ..TestConfig::default()
    };
    let app = ready_app(state_with(stub.clone(), config));

    let started = Instant::now();
    let requests: Vec<_> = ["cat", "dog", "bird"]
        .into_iter()
        .map(|prompt| {
            let app = app.clone();
            tokio::spawn(async move { post_json(app, "/v1/embedding", json!({ "prompt": prompt })).await })
        })
        .collect();

    for request in requests {
        let (status, _) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(stub.peak_in_flight(), 2);
    assert_eq!(stub.calls(), 3);
    // The third request waited for a slot
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_batch_fan_out_is_bounded() {
    let stub = Arc::new(StubEmbedder::new().with_default_delay(Duration::from_millis(30)));
    let config = TestConfig {
        max_batch_parallelism: 2,
        ..TestConfig::default()
    };
    let app = ready_app(state_with(stub.clone(), config));

    let (status, body) = post_json(
        app,
        "/v1/embedding/batch",
        json!({ "prompts": ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embeddings"].as_array().unwrap().len(), 6);
    assert_eq!(stub.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_embed_calls_are_capped_across_concurrent_batches() {
    let stub = Arc::new(StubEmbedder::new().with_default_delay(Duration::from_millis(40)));
    let config = TestConfig {
        max_concurrent_requests: 3,
        max_batch_parallelism: 4,
        ..TestConfig::default()
    };
    let app = ready_app(state_with(stub.clone(), config));

    let batch = json!({ "prompts": ["a", "b", "c", "d"] });
    let (first, second) = tokio::join!(
        post_json(app.clone(), "/v1/embedding/batch", batch.clone()),
        post_json(app, "/v1/embedding/batch", batch),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert!(stub.peak_in_flight() <= 3);
    assert_eq!(stub.calls(), 8);
}

#[tokio::test]
async fn test_timeout_is_unavailable_and_service_stays_ready() {
    let stub = Arc::new(StubEmbedder::new().with_delay("slow", Duration::from_millis(500)));
    let config = TestConfig {
        embed_timeout: Duration::from_millis(50),
        ..TestConfig::default()
    };
    let state = state_with(stub.clone(), config);
    let lifecycle = state.lifecycle.clone();
    let app = ready_app(state);

    let started = Instant::now();
    let (status, body) = post_json(app.clone(), "/v1/embedding", json!({ "prompt": "slow" })).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorType"], "unavailable");
    assert_eq!(body["retryable"], true);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(stub.in_flight(), 0, "timed out call was cancelled");

    assert_eq!(lifecycle.state(), LifecycleState::Ready);
    let (status, body) = post_json(app, "/v1/embedding", json!({ "prompt": "cat" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["embedding"], json!([3.0, 99.0, 0.0]));
}

#[tokio::test]
async fn test_timeout_fails_fast_batch() {
    let stub = Arc::new(StubEmbedder::new().with_delay("slow", Duration::from_millis(500)));
    let config = TestConfig {
        embed_timeout: Duration::from_millis(50),
        ..TestConfig::default()
    };
    let app = ready_app(state_with(stub, config));

    let (status, body) = post_json(
        app,
        "/v1/embedding/batch",
        json!({ "prompts": ["cat", "slow", "bird"] }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["errorType"], "unavailable");
}

#[tokio::test]
async fn test_dropped_request_cancels_embed_call() {
    let stub = Arc::new(StubEmbedder::new().with_delay("slow", Duration::from_secs(5)));
    let app = ready_app(state_with(stub.clone(), TestConfig::default()));

    let request = tokio::spawn(post_json(app, "/v1/embedding", json!({ "prompt": "slow" })));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stub.in_flight(), 1);

    request.abort();
    let _ = request.await;
    assert_eq!(stub.in_flight(), 0);
}
