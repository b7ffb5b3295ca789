// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod embeddings;
pub mod version;

pub use api::{
    create_app, AppState, ApiError, BatchPolicy, Lifecycle, LifecycleState, RequestHandler,
    ServiceEndpoint, ShutdownTrigger, StopReport,
};
pub use client::{ClientError, EmbeddingClient};
pub use config::{ConfigError, ServerConfig};
pub use embeddings::{
    BoundedEmbedder, Embedder, EmbedderError, EmbeddingModelConfig, EmbeddingModelManager,
    EmbeddingVector,
};
