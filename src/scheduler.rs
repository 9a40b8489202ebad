// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Unifies the ad hoc timers (`timeout_add`, deferred single-shots) that
//! would otherwise be scattered across the fault detector, the recorder,
//! and the supervisor into one abstraction: `after(delay, callback)`,
//! where every callback carries the generation it was scheduled under
//! and silently no-ops if `cancel_all` has since moved the generation on.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// One logical timer slot. A camera's supervisor and its recorder each
/// own a `Scheduler`; cancelling one never affects the other.
#[derive(Clone)]
pub struct Scheduler {
    generation: Arc<AtomicU64>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self { generation: Arc::new(AtomicU64::new(0)) }
    }

    /// Returns the generation currently in effect.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidates every timer scheduled before this call. Returns the new
    /// generation so a caller can log it if useful.
    pub fn cancel_all(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Schedules `callback` to run after `delay` on the current generation.
    /// If `cancel_all` advances the generation before the timer fires, the
    /// callback is dropped without running.
    pub fn after<F, Fut>(&self, delay: Duration, callback: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.clone();
        let scheduled_at = generation.load(Ordering::SeqCst);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) == scheduled_at {
                callback().await;
            } else {
                tracing::debug!(scheduled_at, "scheduled callback skipped, generation advanced");
            }
        })
    }

    /// True if `generation` (captured earlier) is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_when_not_cancelled() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let handle = scheduler.after(Duration::from_millis(10), move || async move {
            fired2.store(true, Ordering::SeqCst);
        });
        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stale_callback_is_skipped_after_cancel() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let handle = scheduler.after(Duration::from_millis(30), move || async move {
            fired2.store(true, Ordering::SeqCst);
        });
        scheduler.cancel_all();
        handle.await.unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
