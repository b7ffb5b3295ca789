// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request handling for GetEmbedding and GetEmbeddingBatch
//!
//! [`RequestHandler`] is transport independent: it validates, calls the
//! injected [`Embedder`] and assembles responses. The axum handlers at the
//! bottom of this file only adapt it to HTTP.
//!
//! Batches fan out over the embedder with bounded parallelism. Results are
//! written into slots indexed by the prompt's original position, so the
//! response order always matches the request order regardless of which
//! embed call completes first.

use crate::api::embed::{
    BatchPolicy, EmbeddingBatchRequest, EmbeddingBatchResponse, EmbeddingRequest,
    EmbeddingResponse, RequestLimits,
};
use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::embeddings::{Embedder, EmbeddingVector};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Validates requests and drives the embedder
pub struct RequestHandler {
    embedder: Arc<dyn Embedder>,
    limits: RequestLimits,
    max_batch_parallelism: usize,
}

impl RequestHandler {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        limits: RequestLimits,
        max_batch_parallelism: usize,
    ) -> Self {
        Self {
            embedder,
            limits,
            max_batch_parallelism: max_batch_parallelism.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    pub fn max_batch_parallelism(&self) -> usize {
        self.max_batch_parallelism
    }

    /// Embeds a single prompt
    ///
    /// Empty prompts fail with `InvalidArgument` before the embedder is called.
    pub async fn handle_single(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ApiError> {
        request.validate(&self.limits)?;
        let embedding = self.embed_checked(&request.prompt).await?;
        Ok(EmbeddingResponse::new(embedding))
    }

    /// Embeds a batch of prompts, preserving order
    ///
    /// The request's [`BatchPolicy`] decides what happens to failures:
    /// fail-fast aborts on the first one, partial-success marks the failing
    /// slot and keeps going.
    pub async fn handle_batch(
        &self,
        request: &EmbeddingBatchRequest,
    ) -> Result<EmbeddingBatchResponse, ApiError> {
        request.validate_size(&self.limits)?;
        if request.prompts.is_empty() {
            return Ok(EmbeddingBatchResponse::default());
        }

        match request.policy {
            BatchPolicy::FailFast => self.batch_fail_fast(request).await,
            BatchPolicy::PartialSuccess => Ok(self.batch_partial_success(request).await),
        }
    }

    async fn embed_checked(&self, prompt: &str) -> Result<EmbeddingVector, ApiError> {
        let embedding = self.embedder.embed(prompt).await?;
        let expected = self.embedder.dimension();
        if embedding.len() != expected {
            return Err(ApiError::InternalError(format!(
                "model {} returned {} dimensions, expected {}",
                self.embedder.model_name(),
                embedding.len(),
                expected
            )));
        }
        Ok(embedding)
    }

    async fn batch_fail_fast(
        &self,
        request: &EmbeddingBatchRequest,
    ) -> Result<EmbeddingBatchResponse, ApiError> {
        request.validate(&self.limits)?;

        let mut slots: Vec<Option<EmbeddingVector>> = vec![None; request.prompts.len()];
        let mut results = stream::iter(request.prompts.iter().cloned().enumerate())
            .map(|(index, prompt)| async move { (index, self.embed_checked(&prompt).await) })
            .buffer_unordered(self.max_batch_parallelism);

        while let Some((index, result)) = results.next().await {
            match result {
                Ok(embedding) => slots[index] = Some(embedding),
                Err(e) => {
                    // Returning drops the stream, cancelling calls still in flight
                    debug!(index, "Aborting batch on failed prompt: {}", e);
                    return Err(e);
                }
            }
        }

        let embeddings = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    ApiError::InternalError(format!("batch slot {} was never filled", index))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(embeddings.into())
    }

    async fn batch_partial_success(&self, request: &EmbeddingBatchRequest) -> EmbeddingBatchResponse {
        let mut slots: Vec<Option<EmbeddingResponse>> = vec![None; request.prompts.len()];
        for (index, err) in request.prompt_errors(&self.limits) {
            slots[index] = Some(EmbeddingResponse::failed(&err));
        }

        let pending: Vec<(usize, String)> = request
            .prompts
            .iter()
            .enumerate()
            .filter(|(index, _)| slots[*index].is_none())
            .map(|(index, prompt)| (index, prompt.clone()))
            .collect();

        let mut results = stream::iter(pending)
            .map(|(index, prompt)| async move { (index, self.embed_checked(&prompt).await) })
            .buffer_unordered(self.max_batch_parallelism);

        while let Some((index, result)) = results.next().await {
            slots[index] = Some(match result {
                Ok(embedding) => EmbeddingResponse::new(embedding),
                Err(e) => {
                    warn!(index, "Prompt failed in partial-success batch: {}", e);
                    EmbeddingResponse::failed(&e)
                }
            });
        }

        let embeddings = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    EmbeddingResponse::failed(&ApiError::InternalError(
                        "batch slot was never filled".to_string(),
                    ))
                })
            })
            .collect();

        EmbeddingBatchResponse { embeddings }
    }
}

fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidArgument(rejection.body_text()))
}

/// POST /v1/embedding handler (GetEmbedding)
pub async fn get_embedding_handler(
    State(state): State<AppState>,
    request: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let request = payload(request)?;
    let started = Instant::now();

    let response = state.handler.handle_single(&request).await.map_err(|e| {
        warn!(error_type = e.error_type(), "GetEmbedding failed: {}", e);
        e
    })?;

    debug!(
        prompt_chars = request.char_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "GetEmbedding complete"
    );
    Ok(Json(response))
}

/// POST /v1/embedding/batch handler (GetEmbeddingBatch)
pub async fn get_embedding_batch_handler(
    State(state): State<AppState>,
    request: Result<Json<EmbeddingBatchRequest>, JsonRejection>,
) -> Result<Json<EmbeddingBatchResponse>, ApiError> {
    let request = payload(request)?;
    let started = Instant::now();

    let response = state.handler.handle_batch(&request).await.map_err(|e| {
        warn!(
            error_type = e.error_type(),
            prompts = request.prompts.len(),
            "GetEmbeddingBatch failed: {}",
            e
        );
        e
    })?;

    info!(
        prompts = request.prompts.len(),
        failed = response.failed_count(),
        policy = ?request.policy,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "GetEmbeddingBatch complete"
    );
    Ok(Json(response))
}
