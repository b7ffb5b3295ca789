// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Shared fixtures for the integration tests
//!
//! [`StubEmbedder`] stands in for the ONNX model: it returns
//! `[chars, first char code, 0.0]` for each prompt, can be told to sleep or fail per
//! prompt, and records how many calls ran at once.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use fabstir_embedding_server::{
    api::{
        create_app, AppState, Lifecycle, LifecycleState, RequestHandler, RequestLimits,
        ServerError, ServiceEndpoint, ShutdownTrigger, StopReport,
    },
    embeddings::{BoundedEmbedder, Embedder, EmbedderError, EmbeddingVector},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const DIMENSION: usize = 3;

#[derive(Default)]
pub struct StubEmbedder {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    failures: HashMap<String, EmbedderError>,
    dimension_override: Option<usize>,
    length_only: bool,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, prompt: &str, delay: Duration) -> Self {
        self.delays.insert(prompt.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn failing_on(mut self, prompt: &str, err: EmbedderError) -> Self {
        self.failures.insert(prompt.to_string(), err);
        self
    }

    /// Returns `[chars, 0.0, 0.0]`
    pub fn length_only(mut self) -> Self {
        self.length_only = true;
        self
    }

    /// Returns vectors of `len` values while still advertising [`DIMENSION`]
    pub fn returning_dimension(mut self, len: usize) -> Self {
        self.dimension_override = Some(len);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the call is cancelled
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbedderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        let delay = self.delays.get(text).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.failures.get(text) {
            return Err(err.clone());
        }

        let first = if self.length_only {
            0
        } else {
            text.chars().next().map(|c| c as u32).unwrap_or(0)
        };
        let mut vector = vec![text.chars().count() as f32, first as f32, 0.0];
        if let Some(len) = self.dimension_override {
            vector.resize(len, 0.0);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

pub struct TestConfig {
    pub max_concurrent_requests: usize,
    pub embed_timeout: Duration,
    pub max_batch_parallelism: usize,
    pub limits: RequestLimits,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            embed_timeout: Duration::from_secs(5),
            max_batch_parallelism: 4,
            limits: RequestLimits::default(),
        }
    }
}

/// Wires a stub behind the same layers the server binary uses
pub fn state_with(embedder: Arc<StubEmbedder>, config: TestConfig) -> AppState {
    let bounded = BoundedEmbedder::new(
        embedder,
        config.max_concurrent_requests,
        config.embed_timeout,
    );
    let handler = RequestHandler::new(
        Arc::new(bounded),
        config.limits,
        config.max_batch_parallelism,
    );
    AppState::new(handler, Lifecycle::new(), config.max_concurrent_requests)
}

/// Router whose lifecycle is already `Ready`
pub fn ready_app(state: AppState) -> Router {
    state
        .lifecycle
        .transition(LifecycleState::Ready)
        .expect("Initializing -> Ready");
    create_app(state)
}

pub async fn post_json(
    app: Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    send(app, request).await
}

pub async fn get_json(app: Router, path: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request");
    send(app, request).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("JSON response body")
    };
    (status, json)
}

/// A bound endpoint serving in the background
pub struct RunningEndpoint {
    pub addr: SocketAddr,
    pub lifecycle: Lifecycle,
    pub shutdown: oneshot::Sender<ShutdownTrigger>,
    pub task: JoinHandle<Result<StopReport, ServerError>>,
}

impl RunningEndpoint {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(self, trigger: ShutdownTrigger) -> Result<StopReport, ServerError> {
        let _ = self.shutdown.send(trigger);
        self.task.await.expect("serve task panicked")
    }
}

pub async fn spawn_endpoint(state: AppState, grace: Duration) -> RunningEndpoint {
    let endpoint = ServiceEndpoint::bind("127.0.0.1:0", state, grace)
        .await
        .expect("bind ephemeral port");
    let addr = endpoint.local_addr();
    let lifecycle = endpoint.lifecycle();

    let (shutdown, rx) = oneshot::channel();
    let task = tokio::spawn(endpoint.serve(async move {
        rx.await.unwrap_or(ShutdownTrigger::Signal)
    }));

    lifecycle.wait_for(LifecycleState::Ready).await;
    RunningEndpoint {
        addr,
        lifecycle,
        shutdown,
        task,
    }
}
