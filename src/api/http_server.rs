// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::embed::{get_embedding_batch_handler, get_embedding_handler, RequestHandler};
use super::lifecycle::{Lifecycle, LifecycleState};
use super::ApiError;
use crate::embeddings::{EmbeddingModelManager, ModelInfo};

/// Shared state for every route
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<RequestHandler>,
    pub lifecycle: Lifecycle,
    /// Present when the embedder is the production inference pool
    pub model_manager: Option<EmbeddingModelManager>,
    /// Bound on requests handled at once, excess requests queue
    pub max_concurrent_requests: usize,
}

impl AppState {
    pub fn new(handler: RequestHandler, lifecycle: Lifecycle, max_concurrent_requests: usize) -> Self {
        Self {
            handler: Arc::new(handler),
            lifecycle,
            model_manager: None,
            max_concurrent_requests: max_concurrent_requests.max(1),
        }
    }

    pub fn with_model_manager(mut self, manager: EmbeddingModelManager) -> Self {
        self.model_manager = Some(manager);
        self
    }

    fn model_info(&self) -> ModelInfo {
        match &self.model_manager {
            Some(manager) => manager.model_info(),
            None => {
                let embedder = self.handler.embedder();
                ModelInfo {
                    name: embedder.model_name().to_string(),
                    dimensions: embedder.dimension(),
                    available: true,
                    workers: 0,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub state: String,
    pub model: String,
    pub dimensions: usize,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Builds the router
///
/// Embedding routes are rejected with `unavailable` unless the lifecycle is
/// `Ready`, and share one concurrency limit. Health and model listing stay
/// reachable while draining.
pub fn create_app(state: AppState) -> Router {
    let embedding_routes = Router::new()
        .route("/v1/embedding", post(get_embedding_handler))
        .route("/v1/embedding/batch", post(get_embedding_batch_handler))
        .route_layer(GlobalConcurrencyLimitLayer::new(state.max_concurrent_requests))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_ready));

    Router::new()
        .merge(embedding_routes)
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn require_ready(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let current = state.lifecycle.state();
    if current == LifecycleState::Ready {
        next.run(request).await
    } else {
        ApiError::ServiceUnavailable(format!("service is {}", current)).into_response()
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let current = state.lifecycle.state();
    let model = state.model_info();
    let healthy = current == LifecycleState::Ready && model.available;

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        state: current.to_string(),
        model: model.name,
        dimensions: model.dimensions,
        version: crate::version::VERSION_NUMBER.to_string(),
    })
}

async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: vec![state.model_info()],
    })
}
