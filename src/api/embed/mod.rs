// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding API Module
//!
//! GetEmbedding (`POST /v1/embedding`) and GetEmbeddingBatch
//! (`POST /v1/embedding/batch`).

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{get_embedding_batch_handler, get_embedding_handler, RequestHandler};
pub use request::{BatchPolicy, EmbeddingBatchRequest, EmbeddingRequest, RequestLimits};
pub use response::{EmbeddingBatchResponse, EmbeddingResponse, ItemError};
