use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts frontier items that have been enqueued but not yet finished.
///
/// Every item is added *before* it is sent and completed exactly once,
/// either when the dispatcher skips it or when its worker is done. The walk
/// is over when the count returns to zero.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    pending: AtomicUsize,
    idle: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.pending.fetch_add(n, Ordering::AcqRel);
    }

    /// Mark one item finished, waking waiters if it was the last.
    pub fn complete(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "completed more items than were added");
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Resolves once no items are outstanding.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent `complete` can't be missed.
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Guard that completes one item when dropped, on every exit path.
    pub fn guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard {
            tracker: Arc::clone(self),
        }
    }
}

pub struct CompletionGuard {
    tracker: Arc<CompletionTracker>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.tracker.complete();
    }
}
