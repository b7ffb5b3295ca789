// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Startup configuration
//!
//! Every setting can come from a flag or an environment variable (a `.env`
//! file is loaded first). Configuration is read once at startup and never
//! changes afterwards.

use crate::api::RequestLimits;
use crate::embeddings::PoolConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid listen address '{0}': expected host:port")]
    InvalidListenAddress(String),

    #[error("{0} must be greater than 0")]
    MustBePositive(&'static str),

    #[error("{name} cannot exceed {max}")]
    TooLarge { name: &'static str, max: usize },

    #[error("Model identifier cannot be empty")]
    EmptyModelIdentifier,
}

/// Largest value accepted for settings backed by a semaphore or bounded channel
pub const MAX_PERMITS: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Embedding service configuration
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "fabstir-embedding-server")]
#[command(about = "Serves text embeddings over HTTP", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Network address to bind
    #[arg(long, env = "LISTEN_ADDRESS", default_value = "0.0.0.0:50051")]
    pub listen_address: String,

    /// Requests handled at once; also caps embed calls in flight process-wide
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 10)]
    pub max_concurrent_requests: usize,

    /// Per-call timeout for the embedder, in milliseconds
    #[arg(long, env = "EMBED_TIMEOUT_MS", default_value_t = 30_000)]
    pub embed_timeout_ms: u64,

    /// Embedding model to load, a directory name under the models directory
    #[arg(long, env = "MODEL_IDENTIFIER", default_value = "all-MiniLM-L6-v2")]
    pub model_identifier: String,

    /// Directory holding one sub-directory per model
    #[arg(long, env = "MODELS_DIR", default_value = "./models")]
    pub models_dir: PathBuf,

    /// Embed calls in flight per batch
    #[arg(long, env = "MAX_BATCH_PARALLELISM", default_value_t = 4)]
    pub max_batch_parallelism: usize,

    /// Maximum prompts per batch request
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 96)]
    pub max_batch_size: usize,

    /// Maximum characters per prompt
    #[arg(long, env = "MAX_PROMPT_CHARS", default_value_t = 8192)]
    pub max_prompt_chars: usize,

    /// Dedicated inference threads, each with its own model replica
    #[arg(long, env = "INFERENCE_WORKERS", default_value_t = 1)]
    pub inference_workers: usize,

    /// Inference jobs that may wait for a worker
    #[arg(long, env = "INFERENCE_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// How long in-flight requests may run after a shutdown signal, in milliseconds
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value_t = 30_000)]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["fabstir-embedding-server"])
    }
}

impl ServerConfig {
    /// Loads `.env` (if present) and parses flags and environment
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_address.parse::<SocketAddr>().is_err() {
            let valid_host_port = self
                .listen_address
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid_host_port {
                return Err(ConfigError::InvalidListenAddress(
                    self.listen_address.clone(),
                ));
            }
        }

        let positive = [
            ("max_concurrent_requests", self.max_concurrent_requests as u64),
            ("embed_timeout_ms", self.embed_timeout_ms),
            ("max_batch_parallelism", self.max_batch_parallelism as u64),
            ("max_batch_size", self.max_batch_size as u64),
            ("max_prompt_chars", self.max_prompt_chars as u64),
            ("inference_workers", self.inference_workers as u64),
            ("queue_capacity", self.queue_capacity as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::MustBePositive(*name));
        }

        let permit_backed = [
            ("max_concurrent_requests", self.max_concurrent_requests),
            ("queue_capacity", self.queue_capacity),
        ];
        if let Some((name, _)) = permit_backed.iter().find(|(_, value)| *value > MAX_PERMITS) {
            return Err(ConfigError::TooLarge {
                name: *name,
                max: MAX_PERMITS,
            });
        }

        if self.model_identifier.trim().is_empty() {
            return Err(ConfigError::EmptyModelIdentifier);
        }

        Ok(())
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn request_limits(&self) -> RequestLimits {
        RequestLimits {
            max_prompt_chars: self.max_prompt_chars,
            max_batch_size: self.max_batch_size,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.inference_workers,
            queue_capacity: self.queue_capacity,
        }
    }
}
