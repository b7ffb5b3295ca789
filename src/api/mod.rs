// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embed;
pub mod errors;
pub mod http_server;
pub mod lifecycle;
pub mod server;

pub use embed::{
    BatchPolicy, EmbeddingBatchRequest, EmbeddingBatchResponse, EmbeddingRequest,
    EmbeddingResponse, ItemError, RequestHandler, RequestLimits,
};
pub use errors::{ApiError, ErrorResponse};
pub use http_server::{create_app, AppState, HealthResponse, ModelsResponse};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState};
pub use server::{shutdown_signal, ServerError, ServiceEndpoint, ShutdownTrigger, StopReport};
