// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Inference worker pool
//!
//! Model sessions are not reentrant and inference is blocking, so embedding
//! requests are pushed onto a bounded queue and served by a fixed number of
//! dedicated OS threads, each owning its own model replica. Async callers
//! only await a oneshot reply and never block a runtime thread.
//!
//! A worker that panics retires itself. When the last worker is gone the pool
//! cancels its crash token so the service endpoint can shut down.

use crate::embeddings::{Embedder, EmbedderError, EmbeddingVector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A blocking model owned by a single worker thread
pub trait InferenceBackend: Send + 'static {
    /// Embeds one text. Called from a dedicated thread, may block.
    fn infer(&mut self, text: &str) -> Result<EmbeddingVector, EmbedderError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads (and model replicas)
    pub workers: usize,
    /// Jobs that may wait in the queue before callers are suspended
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
        }
    }
}

struct InferenceJob {
    text: String,
    reply: oneshot::Sender<Result<EmbeddingVector, EmbedderError>>,
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<InferenceJob>>>;

/// [`Embedder`] backed by dedicated inference threads
pub struct InferencePool {
    sender: mpsc::Sender<InferenceJob>,
    model_name: String,
    dimension: usize,
    live_workers: Arc<AtomicUsize>,
    crashed: CancellationToken,
}

impl std::fmt::Debug for InferencePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePool")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}

impl InferencePool {
    /// Builds one backend per worker with `factory` and starts the workers
    ///
    /// Loading is blocking; call from `spawn_blocking` when inside a runtime.
    /// Fails if any replica fails to load or replicas disagree on dimension.
    pub fn start<B, F>(config: PoolConfig, mut factory: F) -> Result<Self>
    where
        B: InferenceBackend,
        F: FnMut(usize) -> Result<B>,
    {
        if config.workers == 0 {
            anyhow::bail!("Inference pool needs at least one worker");
        }
        if config.queue_capacity == 0 {
            anyhow::bail!("Inference queue capacity must be greater than 0");
        }

        let mut backends = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let backend =
                factory(index).with_context(|| format!("Failed to load model replica {}", index))?;
            backends.push(backend);
        }

        let dimension = backends[0].dimension();
        let model_name = backends[0].model_name().to_string();
        if dimension == 0 {
            anyhow::bail!("Model {} reports a zero dimension", model_name);
        }
        if let Some(other) = backends.iter().find(|b| b.dimension() != dimension) {
            anyhow::bail!(
                "Model replicas disagree on dimension: {} vs {}",
                dimension,
                other.dimension()
            );
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let live_workers = Arc::new(AtomicUsize::new(backends.len()));
        let crashed = CancellationToken::new();

        for (index, backend) in backends.into_iter().enumerate() {
            let receiver = receiver.clone();
            let live = live_workers.clone();
            let crashed = crashed.clone();
            std::thread::Builder::new()
                .name(format!("inference-{}", index))
                .spawn(move || run_worker(index, backend, receiver, live, crashed))
                .context("Failed to spawn inference worker thread")?;
        }

        info!(
            model = %model_name,
            dimension,
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Inference pool started"
        );

        Ok(Self {
            sender,
            model_name,
            dimension,
            live_workers,
            crashed,
        })
    }

    /// Number of workers still serving jobs
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Cancelled once every worker has crashed
    pub fn crash_token(&self) -> CancellationToken {
        self.crashed.clone()
    }
}

#[async_trait]
impl Embedder for InferencePool {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        let (reply, response) = oneshot::channel();
        let job = InferenceJob {
            text: text.to_owned(),
            reply,
        };

        self.sender
            .send(job)
            .await
            .map_err(|_| EmbedderError::ModelUnavailable("inference queue is closed".into()))?;

        response.await.map_err(|_| {
            EmbedderError::ModelUnavailable("inference worker dropped the request".into())
        })?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn next_job(receiver: &SharedReceiver) -> Option<InferenceJob> {
    // Poisoning only happens if a worker panicked mid-recv, the queue itself is intact
    let mut guard = receiver.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.blocking_recv()
}

fn run_worker<B: InferenceBackend>(
    index: usize,
    mut backend: B,
    receiver: SharedReceiver,
    live: Arc<AtomicUsize>,
    crashed: CancellationToken,
) {
    debug!(worker = index, "Inference worker running");
    let mut panicked = false;

    while let Some(job) = next_job(&receiver) {
        if job.reply.is_closed() {
            debug!(worker = index, "Skipping abandoned inference job");
            continue;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| backend.infer(&job.text))) {
            Ok(result) => {
                let _ = job.reply.send(result);
            }
            Err(_) => {
                error!(worker = index, "Inference worker panicked, retiring it");
                let _ = job.reply.send(Err(EmbedderError::ModelUnavailable(
                    "inference worker crashed".into(),
                )));
                panicked = true;
                break;
            }
        }
    }

    let remaining = live.fetch_sub(1, Ordering::SeqCst) - 1;
    if panicked {
        warn!(worker = index, remaining, "Inference worker stopped after crash");
        if remaining == 0 {
            error!("All inference workers have crashed");
            crashed.cancel();
        }
    } else {
        debug!(worker = index, "Inference worker stopped");
    }
}
