// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HTTP client for the embedding service
//!
//! Mirrors the two service calls. Server-side errors are decoded from the
//! JSON error body so callers can tell retryable failures apart.

use crate::api::{
    EmbeddingBatchRequest, EmbeddingBatchResponse, EmbeddingRequest, EmbeddingResponse,
    ErrorResponse, HealthResponse,
};
use crate::embeddings::EmbeddingVector;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to reach embedding service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedding service returned {status} ({}): {}", .body.error_type, .body.message)]
    Status { status: u16, body: ErrorResponse },

    #[error("partial-success slot {index} failed: {message}")]
    SlotFailed { index: usize, message: String },
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_timeout() || e.is_connect(),
            ClientError::Status { body, .. } => body.retryable,
            ClientError::SlotFailed { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
}

impl EmbeddingClient {
    /// Creates a client for `server`, accepting `host:port` or a full URL
    pub fn new(server: &str) -> Result<Self, ClientError> {
        Self::with_timeout(server, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(server: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(10))
            .build()?;

        let trimmed = server.trim_end_matches('/');
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GetEmbedding
    pub async fn get_embedding(&self, prompt: &str) -> Result<EmbeddingVector, ClientError> {
        let response: EmbeddingResponse = self
            .post("/v1/embedding", &EmbeddingRequest::new(prompt))
            .await?;
        Ok(response.embedding)
    }

    /// GetEmbeddingBatch with fail-fast semantics, vectors in prompt order
    pub async fn get_embedding_batch(
        &self,
        prompts: &[String],
    ) -> Result<Vec<EmbeddingVector>, ClientError> {
        let response = self
            .get_embedding_batch_with(&EmbeddingBatchRequest::new(prompts.iter().cloned()))
            .await?;

        response
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot.error {
                None => Ok(slot.embedding),
                Some(err) => Err(ClientError::SlotFailed {
                    index,
                    message: err.message,
                }),
            })
            .collect()
    }

    /// GetEmbeddingBatch with an explicit request, including its policy
    pub async fn get_embedding_batch_with(
        &self,
        request: &EmbeddingBatchRequest,
    ) -> Result<EmbeddingBatchResponse, ClientError> {
        self.post("/v1/embedding/batch", request).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Sending embedding request");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let bytes = response.bytes().await?;
        let body = serde_json::from_slice::<ErrorResponse>(&bytes).unwrap_or_else(|_| ErrorResponse {
            error_type: "unknown".to_string(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
            retryable: status.is_server_error(),
            request_id: None,
            details: None,
        });

        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
