// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types returned by embedders
//!
//! Two classes matter to callers:
//! - input the model rejected (not worth retrying unchanged)
//! - a model that cannot serve right now (not loaded, crashed, timed out)

use std::time::Duration;
use thiserror::Error;

/// Errors produced by an [`Embedder`](super::Embedder)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedderError {
    /// The model rejected this specific input (e.g. over the token limit)
    #[error("Model rejected input: {0}")]
    ModelError(String),

    /// The model is not initialized, has crashed, or its queue is closed
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The embed call did not finish within the configured timeout
    #[error("Embedding timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl EmbedderError {
    /// Whether the caller may retry the same input later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedderError::ModelUnavailable(_) | EmbedderError::Timeout(_)
        )
    }
}
