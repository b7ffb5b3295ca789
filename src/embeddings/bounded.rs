// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide limits around an embedder
//!
//! Caps the number of embed calls in flight across all requests and applies
//! the per-call timeout. Waiting for a permit queues the caller and does not
//! count against the timeout.

use crate::embeddings::{Embedder, EmbedderError, EmbeddingVector};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

pub struct BoundedEmbedder {
    inner: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    timeout: Duration,
}

impl BoundedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            timeout,
        }
    }

    /// Embed calls currently running against the inner embedder
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Embedder for BoundedEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbedderError::ModelUnavailable("embedder is shutting down".into()))?;

        match tokio::time::timeout(self.timeout, self.inner.embed(text)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    model = %self.inner.model_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Embed call timed out"
                );
                Err(EmbedderError::Timeout(self.timeout))
            }
        }
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
