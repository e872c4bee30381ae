//! Completion barrier for one load pass.
//!
//! Every directory listing and every file is one unit of work. A unit is an
//! RAII guard: dropping it (on success, failure or panic) releases it exactly
//! once. New units can only be split off a live unit, so the count cannot
//! reach zero while work is still being discovered.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

struct BarrierInner {
    pending: AtomicUsize,
    done: watch::Sender<bool>,
}

impl BarrierInner {
    fn release(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.done.send_replace(true);
        }
    }
}

/// Observer side of the barrier.
#[derive(Clone)]
pub struct LoadBarrier {
    inner: Arc<BarrierInner>,
}

impl LoadBarrier {
    /// Create a barrier holding a single root unit.
    pub fn new() -> (Self, BarrierUnit) {
        let (done, _) = watch::channel(false);
        let inner = Arc::new(BarrierInner {
            pending: AtomicUsize::new(1),
            done,
        });
        let root = BarrierUnit {
            inner: Arc::clone(&inner),
        };
        (Self { inner }, root)
    }

    /// Units not yet released.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Resolve once every unit has been released.
    pub async fn wait(&self) {
        let mut rx = self.inner.done.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// One outstanding unit of work.
#[must_use = "dropping a unit releases it immediately"]
pub struct BarrierUnit {
    inner: Arc<BarrierInner>,
}

impl BarrierUnit {
    /// Account for another unit before this one is released.
    pub fn enqueue(&self) -> BarrierUnit {
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        BarrierUnit {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for BarrierUnit {
    fn drop(&mut self) {
        self.inner.release();
    }
}
