//! C7 — periodic background cleanup.
//!
//! Grounded on `src/cache/memory_aware_manager.rs`'s
//! `MemoryAwareCacheManager::start_monitoring`: a `tokio::spawn`ed loop over
//! `tokio::time::interval`, torn down via `JoinHandle::abort()`.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::coordinator::BlitzCache;
use crate::sizer::HeapSize;

/// Owns the background sweep task for a [`BlitzCache`]. Dropping or calling
/// [`CleanupTask::stop`] aborts the tick loop; the loop body only touches
/// `Arc`-shared, independently-synchronized cache state, so aborting
/// mid-tick can never leave anything half-updated.
pub struct CleanupTask {
    handle: JoinHandle<()>,
}

impl CleanupTask {
    /// Spawns a tick loop that calls `cache.sweep()` every `interval` until
    /// stopped. Requires a running Tokio runtime.
    pub fn spawn<K, V>(cache: Arc<BlitzCache<K, V>>, interval: Duration) -> Self
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: HeapSize + Send + Sync + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if cache.is_disposed() {
                    break;
                }
                cache.sweep();
            }
        });
        Self { handle }
    }

    /// Aborts the tick loop. Safe to call multiple times.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
