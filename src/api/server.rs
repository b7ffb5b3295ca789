// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Service endpoint: binds the router to a listener and drives the lifecycle
//!
//! Binding happens before the lifecycle leaves `Initializing`, so a port
//! that is already in use fails startup instead of reaching `Ready`. On a
//! shutdown trigger the endpoint stops accepting, gives in-flight requests
//! up to the grace period, then stops.

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::http_server::{create_app, AppState};
use super::lifecycle::{Lifecycle, LifecycleError, LifecycleState};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server stopped unexpectedly: {0}")]
    Serve(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Why the endpoint began draining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT/SIGTERM or an explicit shutdown request
    Signal,
    /// Every inference worker died while serving
    EmbedderCrashed,
}

/// Outcome of a completed [`ServiceEndpoint::serve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub trigger: ShutdownTrigger,
    /// False if the grace period expired with requests still in flight
    pub drained: bool,
}

impl StopReport {
    /// `0` only for a signal-initiated shutdown that drained cleanly
    pub fn exit_code(&self) -> u8 {
        match (self.trigger, self.drained) {
            (ShutdownTrigger::Signal, true) => 0,
            _ => 1,
        }
    }
}

pub struct ServiceEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Router,
    lifecycle: Lifecycle,
    grace_period: Duration,
}

impl ServiceEndpoint {
    /// Binds the listener; the lifecycle stays `Initializing`
    pub async fn bind(
        listen_address: &str,
        state: AppState,
        grace_period: Duration,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(listen_address)
            .await
            .map_err(|source| ServerError::Bind {
                addr: listen_address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: listen_address.to_string(),
            source,
        })?;

        let lifecycle = state.lifecycle.clone();
        let app = create_app(state);

        Ok(Self {
            listener,
            local_addr,
            app,
            lifecycle,
            grace_period,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Serves until `shutdown` resolves, then drains and stops
    pub async fn serve<F>(self, shutdown: F) -> Result<StopReport, ServerError>
    where
        F: Future<Output = ShutdownTrigger> + Send,
    {
        let Self {
            listener,
            local_addr,
            app,
            lifecycle,
            grace_period,
        } = self;

        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = drain_rx.await;
        });
        let mut server = tokio::spawn(async move { server.await });

        lifecycle.transition(LifecycleState::Ready)?;
        info!(addr = %local_addr, "Embedding service ready");

        let trigger = tokio::select! {
            finished = &mut server => {
                let reason = match finished {
                    Ok(Ok(())) => "listener closed".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                error!(addr = %local_addr, "Server exited while ready: {}", reason);
                lifecycle.transition(LifecycleState::Stopped)?;
                return Err(ServerError::Serve(reason));
            }
            trigger = shutdown => trigger,
        };

        lifecycle.transition(LifecycleState::Draining)?;
        info!(
            ?trigger,
            grace_ms = grace_period.as_millis() as u64,
            "Draining in-flight requests"
        );
        let _ = drain_tx.send(());

        let drained = match tokio::time::timeout(grace_period, &mut server).await {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                warn!("Server error while draining: {}", e);
                true
            }
            Ok(Err(e)) => {
                warn!("Server task failed while draining: {}", e);
                true
            }
            Err(_) => {
                warn!("Grace period expired, abandoning in-flight requests");
                server.abort();
                false
            }
        };

        lifecycle.transition(LifecycleState::Stopped)?;
        info!(drained, "Embedding service stopped");

        Ok(StopReport { trigger, drained })
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
