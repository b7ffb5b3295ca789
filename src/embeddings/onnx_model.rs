// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Embedding Model Wrapper
//!
//! Wraps ONNX Runtime to run a sentence-transformer model (all-MiniLM-L6-v2
//! by default).
//!
//! Features:
//! - ONNX model loading from disk
//! - GPU acceleration via CUDA (with automatic CPU fallback)
//! - BERT tokenization
//! - Mean pooling over token embeddings, weighted by the attention mask
//! - Output dimension detected from a validation inference at load time
//!
//! A loaded model is NOT shared between threads. Each inference worker owns
//! its own replica (see [`InferencePool`](super::InferencePool)).

use crate::embeddings::worker::InferenceBackend;
use crate::embeddings::{EmbedderError, EmbeddingVector};
use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2, Axis};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{info, warn};

/// Default maximum sequence length for all-MiniLM-L6-v2
pub const DEFAULT_MAX_TOKENS: usize = 256;

/// ONNX-based sentence embedding model
///
/// # Model Details
/// - Input: text (up to `max_length` tokens, longer input is rejected)
/// - Output: `dimension` f32 values (384 for all-MiniLM-L6-v2)
pub struct OnnxEmbeddingModel {
    /// ONNX Runtime session, owned by exactly one worker
    session: Session,

    /// BERT tokenizer
    tokenizer: Tokenizer,

    /// Model name (e.g., "all-MiniLM-L6-v2")
    model_name: String,

    /// Hidden size reported by the validation inference
    dimension: usize,

    /// Maximum accepted sequence length in tokens
    max_length: usize,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

/// Token ids and mask for a single text
struct EncodedText {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl OnnxEmbeddingModel {
    /// Loads the model and tokenizer from disk
    ///
    /// This is blocking and can take seconds; call it from a blocking
    /// context.
    ///
    /// # Errors
    /// Returns error if:
    /// - Model or tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails
    /// - Model output is not `[batch, seq_len, hidden]`
    pub fn load<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
        max_length: usize,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        // Try CUDA first, fall back to CPU if unavailable
        let cuda_result = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path);

        let session = match cuda_result {
            Ok(s) => {
                info!(model = %model_name, "CUDA execution provider initialized");
                s
            }
            Err(e) => {
                warn!(model = %model_name, "CUDA execution provider failed: {}", e);
                Session::builder()
                    .context("Failed to create session builder")?
                    .with_execution_providers([CPUExecutionProvider::default().build()])
                    .context("Failed to set CPU execution provider")?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .context("Failed to set optimization level")?
                    .with_intra_threads(4)
                    .context("Failed to set intra threads")?
                    .commit_from_file(model_path)
                    .context(format!(
                        "Failed to load ONNX model from {}",
                        model_path.display()
                    ))?
            }
        };

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        // Over-long input is rejected in encode(), never silently truncated
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("Failed to disable truncation: {}", e))?;
        tokenizer.with_padding(None);

        let mut model = Self {
            session,
            tokenizer,
            model_name,
            dimension: 0,
            max_length,
        };

        // Validation inference doubles as dimension discovery
        let probe = model
            .run_pooled("validation test")
            .map_err(|e| anyhow::anyhow!("Validation inference failed: {}", e))?;
        if probe.is_empty() {
            anyhow::bail!("Model {} produced an empty embedding", model.model_name);
        }
        model.dimension = probe.len();

        info!(
            model = %model.model_name,
            dimension = model.dimension,
            "ONNX embedding model loaded"
        );

        Ok(model)
    }

    fn encode(&self, text: &str) -> Result<EncodedText, EmbedderError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::ModelError(format!("Tokenization failed: {}", e)))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.len() > self.max_length {
            return Err(EmbedderError::ModelError(format!(
                "input has {} tokens, model limit is {}",
                input_ids.len(),
                self.max_length
            )));
        }

        let attention_mask = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        Ok(EncodedText {
            input_ids,
            attention_mask,
        })
    }

    /// Tokenize, run inference and mean-pool a single text
    fn run_pooled(&mut self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        let encoded = self.encode(text)?;
        let seq_len = encoded.input_ids.len();
        let token_type_ids = vec![0i64; seq_len];

        let to_tensor = |data: Vec<i64>| {
            Array2::from_shape_vec((1, seq_len), data)
                .map_err(|e| EmbedderError::ModelError(format!("Invalid input shape: {}", e)))
                .and_then(|array| Value::from_array(array).map_err(inference_failed))
        };

        let input_ids = to_tensor(encoded.input_ids)?;
        let attention_mask = to_tensor(encoded.attention_mask.clone())?;
        let token_type_ids = to_tensor(token_type_ids)?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
            .map_err(inference_failed)?;

        // Index [0] since different models name their output differently
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_failed)?;

        // Token-level output: [batch, seq_len, hidden]
        if output.ndim() != 3 {
            return Err(EmbedderError::ModelUnavailable(format!(
                "unexpected output shape {:?} (expected [batch, seq_len, hidden])",
                output.shape()
            )));
        }

        let tokens = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<ndarray::Ix2>()
            .map_err(inference_failed)?;

        Ok(mean_pool(tokens, &encoded.attention_mask))
    }
}

impl InferenceBackend for OnnxEmbeddingModel {
    fn infer(&mut self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        let embedding = self.run_pooled(text)?;
        if embedding.len() != self.dimension {
            return Err(EmbedderError::ModelUnavailable(format!(
                "unexpected embedding dimension: {} (expected {})",
                embedding.len(),
                self.dimension
            )));
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn inference_failed(e: impl std::fmt::Display) -> EmbedderError {
    EmbedderError::ModelUnavailable(format!("Inference failed: {}", e))
}

/// Average token embeddings, ignoring positions where the mask is 0
pub(crate) fn mean_pool(tokens: ArrayView2<'_, f32>, attention_mask: &[i64]) -> EmbeddingVector {
    let (seq_len, hidden_dim) = tokens.dim();
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut sum_mask = 0.0f32;

    for i in 0..seq_len.min(attention_mask.len()) {
        let mask_value = attention_mask[i] as f32;
        if mask_value == 0.0 {
            continue;
        }
        sum_mask += mask_value;
        for (j, slot) in pooled.iter_mut().enumerate() {
            *slot += tokens[[i, j]] * mask_value;
        }
    }

    for val in &mut pooled {
        *val /= sum_mask.max(1e-9);
    }

    pooled
}
