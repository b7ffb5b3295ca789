// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response types for the GetEmbedding and GetEmbeddingBatch calls

use crate::api::ApiError;
use crate::embeddings::EmbeddingVector;
use serde::{Deserialize, Serialize};

/// Error marker for one failed slot of a partial-success batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub error_type: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&ApiError> for ItemError {
    fn from(err: &ApiError) -> Self {
        let response = err.to_response(None);
        Self {
            error_type: response.error_type,
            message: response.message,
            retryable: response.retryable,
        }
    }
}

/// Response body for GetEmbedding, and one slot of a batch
///
/// ```json
/// { "embedding": [0.1, 0.2, 0.3] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingResponse {
    pub embedding: EmbeddingVector,

    /// Only set for failed slots in partial-success mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl EmbeddingResponse {
    pub fn new(embedding: EmbeddingVector) -> Self {
        Self {
            embedding,
            error: None,
        }
    }

    pub fn failed(err: &ApiError) -> Self {
        Self {
            embedding: Vec::new(),
            error: Some(err.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Response body for GetEmbeddingBatch, one entry per prompt in request order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingBatchResponse {
    pub embeddings: Vec<EmbeddingResponse>,
}

impl EmbeddingBatchResponse {
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Number of slots carrying an error marker
    pub fn failed_count(&self) -> usize {
        self.embeddings.iter().filter(|e| !e.is_ok()).count()
    }
}

impl From<Vec<EmbeddingVector>> for EmbeddingBatchResponse {
    fn from(vectors: Vec<EmbeddingVector>) -> Self {
        Self {
            embeddings: vectors.into_iter().map(EmbeddingResponse::new).collect(),
        }
    }
}
