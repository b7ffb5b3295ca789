// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding model boundary
//!
//! Everything above this module talks to the model through the [`Embedder`]
//! trait. The production implementation is an [`InferencePool`] of
//! [`OnnxEmbeddingModel`] replicas, wrapped in a [`BoundedEmbedder`] that
//! applies the process-wide in-flight limit and per-call timeout.

pub mod bounded;
pub mod error;
pub mod model_manager;
pub mod onnx_model;
pub mod worker;

pub use bounded::BoundedEmbedder;
pub use error::EmbedderError;
pub use model_manager::{EmbeddingModelConfig, EmbeddingModelManager, ModelInfo};
pub use onnx_model::OnnxEmbeddingModel;
pub use worker::{InferenceBackend, InferencePool, PoolConfig};

use async_trait::async_trait;

/// Fixed-length embedding produced by a model
pub type EmbeddingVector = Vec<f32>;

/// Text to vector capability
///
/// Implementations must be safe to call concurrently without external
/// locking. If the underlying model is not reentrant the implementation
/// serializes access itself.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text into a vector of exactly [`dimension`](Self::dimension) values
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbedderError>;

    /// Output dimension `D`, constant for the lifetime of the embedder
    fn dimension(&self) -> usize;

    /// Name of the loaded model
    fn model_name(&self) -> &str;
}
