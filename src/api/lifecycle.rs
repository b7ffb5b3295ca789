// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Service lifecycle: `Initializing -> Ready -> Draining -> Stopped`
//!
//! Only forward transitions are allowed. `Initializing -> Stopped` covers a
//! fatal startup failure and `Ready -> Stopped` a listener that died on its
//! own.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    Initializing,
    Ready,
    Draining,
    Stopped,
}

impl LifecycleState {
    fn can_move_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Initializing, Ready)
                | (Initializing, Stopped)
                | (Ready, Draining)
                | (Ready, Stopped)
                | (Draining, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Illegal lifecycle transition from {from} to {to}")]
pub struct LifecycleError {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Shared, observable lifecycle state
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Moves to `next`, rejecting backwards or skipped transitions
    pub fn transition(&self, next: LifecycleState) -> Result<(), LifecycleError> {
        let mut current = next;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if state.can_move_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });

        if moved {
            info!(from = %current, to = %next, "Lifecycle transition");
            Ok(())
        } else {
            Err(LifecycleError {
                from: current,
                to: next,
            })
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolves once the lifecycle reaches `target`
    pub async fn wait_for(&self, target: LifecycleState) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state == target).await;
    }
}
