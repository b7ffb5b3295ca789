// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Inference pool behind the full request path
//!
//! Uses a scripted backend so worker crashes can be triggered on demand.

use crate::common::post_json;
use axum::http::StatusCode;
use fabstir_embedding_server::{
    api::{create_app, AppState, Lifecycle, LifecycleState, RequestHandler, RequestLimits},
    embeddings::{
        BoundedEmbedder, EmbedderError, EmbeddingModelManager, EmbeddingVector,
        InferenceBackend, InferencePool, PoolConfig,
    },
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct ScriptedBackend;

impl InferenceBackend for ScriptedBackend {
    fn infer(&mut self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        match text {
            "panic" => panic!("backend crashed"),
            "reject" => Err(EmbedderError::ModelError("input rejected".into())),
            _ => Ok(vec![text.len() as f32, 0.5]),
        }
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn pool_app(workers: usize) -> (axum::Router, EmbeddingModelManager) {
    let pool = InferencePool::start(
        PoolConfig {
            workers,
            queue_capacity: 4,
        },
        |_| Ok(ScriptedBackend),
    )
    .unwrap();
    let manager = EmbeddingModelManager::from_pool(pool);

    let embedder = BoundedEmbedder::new(manager.embedder(), 4, Duration::from_secs(2));
    let handler = RequestHandler::new(Arc::new(embedder), RequestLimits::default(), 2);
    let lifecycle = Lifecycle::new();
    lifecycle.transition(LifecycleState::Ready).unwrap();
    let state = AppState::new(handler, lifecycle, 4).with_model_manager(manager.clone());

    (create_app(state), manager)
}

#[tokio::test]
async fn test_pool_serves_batches_in_order() {
    let (app, manager) = pool_app(2);

    let (status, body) = post_json(
        app,
        "/v1/embedding/batch",
        json!({ "prompts": ["cat", "horse", "ox"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["embeddings"],
        json!([
            { "embedding": [3.0, 0.5] },
            { "embedding": [5.0, 0.5] },
            { "embedding": [2.0, 0.5] },
        ])
    );
    assert_eq!(manager.model_info().workers, 2);
}

#[tokio::test]
async fn test_backend_rejection_is_invalid_argument() {
    let (app, _manager) = pool_app(1);

    let (status, body) = post_json(app, "/v1/embedding", json!({ "prompt": "reject" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorType"], "invalid_argument");
}

#[tokio::test]
async fn test_last_worker_crash_cancels_crash_token() {
    let (app, manager) = pool_app(1);
    let crashed = manager.crash_token();

    let (status, body) = post_json(app.clone(), "/v1/embedding", json!({ "prompt": "panic" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    tokio::time::timeout(Duration::from_secs(2), crashed.cancelled())
        .await
        .expect("crash token cancelled");
    assert!(!manager.model_info().available);

    let (status, health) = crate::common::get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "unhealthy");
}
