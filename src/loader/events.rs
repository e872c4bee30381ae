//! Loader notifications: a single `Ready` and any number of `Error`s.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::defaults::EVENT_CHANNEL_CAPACITY;
use crate::error::Error;

/// Event published by a loader.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// Store connected and initial load finished. Published once.
    Ready,
    /// Discovery, registration, connection or unhandled invocation failure.
    Error(Arc<Error>),
}

impl LoaderEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            Self::Ready => None,
        }
    }
}

/// Fan-out channel owned by the loader.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoaderEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// New receiver seeing every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn ready(&self) {
        // Readiness is also observable through `wait_ready`, so no subscriber is fine.
        let _ = self.tx.send(LoaderEvent::Ready);
    }

    pub(crate) fn error(&self, err: Error) {
        log::warn!("{}", err);
        if self.tx.send(LoaderEvent::Error(Arc::new(err))).is_err() {
            log::error!("Loader error had no subscriber");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
