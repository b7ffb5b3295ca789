// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding Model Manager
//!
//! Resolves a model identifier to files on disk and loads the inference pool
//! during startup. Loading is the slow part of `Initializing` and any failure
//! here is fatal for the process.

use crate::embeddings::onnx_model::DEFAULT_MAX_TOKENS;
use crate::embeddings::{Embedder, InferencePool, OnnxEmbeddingModel, PoolConfig};
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// File name of the ONNX graph inside a model directory
pub const MODEL_FILE: &str = "model.onnx";
/// File name of the tokenizer inside a model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Configuration for loading an embedding model
#[derive(Debug, Clone)]
pub struct EmbeddingModelConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Path to tokenizer JSON file
    pub tokenizer_path: PathBuf,
    /// Inputs longer than this many tokens are rejected
    pub max_tokens: usize,
}

impl EmbeddingModelConfig {
    /// Resolves `<models_dir>/<identifier>/{model.onnx,tokenizer.json}`
    ///
    /// The identifier is treated as a single relative path below
    /// `models_dir`; absolute paths and `..` components are rejected.
    pub fn from_identifier(models_dir: impl AsRef<Path>, identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            anyhow::bail!("Model identifier cannot be empty");
        }

        let relative = Path::new(trimmed);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            anyhow::bail!(
                "Model identifier must be a relative name below the models directory: {}",
                trimmed
            );
        }

        let dir = models_dir.as_ref().join(relative);
        Ok(Self {
            name: trimmed.to_string(),
            model_path: dir.join(MODEL_FILE),
            tokenizer_path: dir.join(TOKENIZER_FILE),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }
}

/// Information about the loaded embedding model
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Embedding dimensions
    pub dimensions: usize,
    /// Whether model is loaded and has live workers
    pub available: bool,
    /// Number of inference workers still running
    pub workers: usize,
}

/// Owner of the production embedder
///
/// # Example
/// ```ignore
/// let config = EmbeddingModelConfig::from_identifier("./models", "all-MiniLM-L6-v2")?;
/// let manager = EmbeddingModelManager::load(config, PoolConfig::default()).await?;
/// let embedder = manager.embedder();
/// let embedding = embedder.embed("Hello world").await?;
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingModelManager {
    pool: Arc<InferencePool>,
}

impl EmbeddingModelManager {
    /// Loads one model replica per worker on the blocking thread pool
    pub async fn load(config: EmbeddingModelConfig, pool_config: PoolConfig) -> Result<Self> {
        let started = Instant::now();
        let name = config.name.clone();
        info!(
            model = %name,
            path = %config.model_path.display(),
            workers = pool_config.workers,
            "Loading embedding model"
        );

        let pool = tokio::task::spawn_blocking(move || {
            InferencePool::start(pool_config, |_| {
                OnnxEmbeddingModel::load(
                    config.name.clone(),
                    &config.model_path,
                    &config.tokenizer_path,
                    config.max_tokens,
                )
            })
        })
        .await
        .context("Model loading task failed")?;

        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                error!(model = %name, "Failed to load embedding model: {:#}", e);
                return Err(e);
            }
        };

        info!(
            model = %name,
            dimension = pool.dimension(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Embedding model ready"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wraps an already started pool
    pub fn from_pool(pool: InferencePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Shared handle to the embedder, injected into the request handler
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.pool.clone()
    }

    /// Cancelled if every inference worker has crashed
    pub fn crash_token(&self) -> CancellationToken {
        self.pool.crash_token()
    }

    pub fn model_info(&self) -> ModelInfo {
        let workers = self.pool.live_workers();
        ModelInfo {
            name: self.pool.model_name().to_string(),
            dimensions: self.pool.dimension(),
            available: workers > 0,
            workers,
        }
    }
}
