//! Readiness gate: store connected AND initial load finished.
//!
//! IDLE -> WAITING -> READY (terminal)

use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

/// Gate state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not started
    Idle,
    /// Waiting for the store and the scripts
    Waiting,
    /// Both preconditions observed
    Ready,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Waiting => write!(f, "WAITING"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

#[derive(Default)]
struct Preconditions {
    store_connected: bool,
    scripts_loaded: bool,
}

/// Fires `Ready` at most once, when both preconditions hold.
pub struct ReadinessGate {
    preconditions: Mutex<Preconditions>,
    state: watch::Sender<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Idle);
        Self {
            preconditions: Mutex::new(Preconditions::default()),
            state,
        }
    }

    /// IDLE -> WAITING. Returns `false` if the gate was already started.
    pub fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == GateState::Idle {
                *state = GateState::Waiting;
                true
            } else {
                false
            }
        })
    }

    /// Record the store connection. Returns `true` if this fired `Ready`.
    pub fn store_connected(&self) -> bool {
        self.satisfy(|p| p.store_connected = true)
    }

    /// Record completion of the initial load. Returns `true` if this fired `Ready`.
    pub fn scripts_loaded(&self) -> bool {
        self.satisfy(|p| p.scripts_loaded = true)
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == GateState::Ready
    }

    /// Resolve once the gate is ready; immediately if it already is.
    pub async fn wait_ready(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == GateState::Ready).await;
    }

    fn satisfy(&self, apply: impl FnOnce(&mut Preconditions)) -> bool {
        let mut preconditions = self
            .preconditions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut preconditions);
        if !(preconditions.store_connected && preconditions.scripts_loaded) {
            return false;
        }

        self.state.send_if_modified(|state| {
            if *state == GateState::Ready {
                false
            } else {
                *state = GateState::Ready;
                true
            }
        })
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
