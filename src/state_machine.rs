//! Pipeline lifecycle: Idle → Running → Stopping → Idle.
//! "Start while running" goes through Stopping first; "stop while idle" is a no-op that
//! never touches the state.

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Running => write!(f, "Running"),
            PipelineState::Stopping => write!(f, "Stopping"),
        }
    }
}

impl PipelineState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Idle, PipelineState::Running)
                | (PipelineState::Running, PipelineState::Stopping)
                | (PipelineState::Stopping, PipelineState::Idle)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Thread-safe state machine with watch channel for reactive subscribers.
pub struct StateMachine {
    state: RwLock<PipelineState>,
    state_tx: watch::Sender<PipelineState>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        Self {
            state: RwLock::new(PipelineState::Idle),
            state_tx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> PipelineState {
        *self.state.read()
    }

    /// Attempt a state transition.
    pub fn transition(&self, next: PipelineState) -> Result<PipelineState, TransitionError> {
        let mut state = self.state.write();
        let current = *state;
        if !current.can_transition_to(next) {
            let err = TransitionError {
                from: current,
                to: next,
            };
            warn!("{}", err);
            return Err(err);
        }
        *state = next;
        self.state_tx.send_replace(next);
        info!(from = %current, to = %next, "state_transition");
        Ok(next)
    }

    /// Force Idle from any state.
    pub fn force_idle(&self) {
        let mut state = self.state.write();
        let prev = *state;
        *state = PipelineState::Idle;
        self.state_tx.send_replace(PipelineState::Idle);
        info!(from = %prev, "force_idle");
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
