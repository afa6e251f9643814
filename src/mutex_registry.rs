//! C1 — per-key mutual exclusion with reference counting and lazy release.
//!
//! Grounded on `src/session/thread_local_cache.rs`'s `DashMap`-keyed
//! registries and `src/session/pool.rs`'s `Arc<Semaphore>` +
//! `OwnedSemaphorePermit` guard pattern in the teacher codebase.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct KeySlot {
    semaphore: Arc<Semaphore>,
    refcount: AtomicUsize,
    last_touched: Mutex<Instant>,
}

impl KeySlot {
    fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            refcount: AtomicUsize::new(0),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_touched.lock() = Instant::now();
    }
}

/// Decrements a [`KeySlot`]'s refcount exactly once, whether the acquire
/// completed normally or was cancelled mid-wait. Armed on creation; the
/// successful-acquire path disarms it and hands the decrement duty to
/// [`KeyMutexGuard`]'s `Drop` instead, so the pair never double-decrements.
struct Reservation {
    slot: Arc<KeySlot>,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.slot.refcount.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// RAII guard for exclusive ownership of a key's mutex. Dropping it releases
/// the semaphore permit and decrements the refcount incremented at acquire
/// time, updating `last_touched` so the protection window restarts.
pub struct KeyMutexGuard<K> {
    key: K,
    slot: Arc<KeySlot>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<K> Drop for KeyMutexGuard<K> {
    fn drop(&mut self) {
        self.permit.take();
        self.slot.touch();
        self.slot.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<K> KeyMutexGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

/// Registry mapping a cache key to a lazily-created, reference-counted
/// [`KeySlot`]. Same key yields the same slot until all holders/waiters have
/// dropped and [`KeyedMutexRegistry::sweep`] has removed it; a fresh slot is
/// created on next use.
pub struct KeyedMutexRegistry<K> {
    slots: DashMap<K, Arc<KeySlot>>,
    protection_window: Duration,
}

impl<K> KeyedMutexRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(protection_window: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            protection_window,
        }
    }

    fn slot_for(&self, key: &K) -> Arc<KeySlot> {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeySlot::new()))
            .clone()
    }

    /// Suspend until this key's mutex is free, then return a guard holding
    /// it. Never contends with a different key's acquire.
    pub async fn acquire_async(&self, key: K) -> KeyMutexGuard<K> {
        let slot = self.slot_for(&key);
        slot.refcount.fetch_add(1, Ordering::AcqRel);
        let mut reservation = Reservation { slot: slot.clone(), armed: true };

        let permit = slot
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("key semaphore is never closed while its slot is reachable");

        reservation.armed = false;
        KeyMutexGuard { key, slot, permit: Some(permit) }
    }

    /// Blocking variant of [`Self::acquire_async`] for synchronous callers.
    /// Uses the exact same `Semaphore::acquire_owned` future as the async
    /// path — `tokio::sync::Semaphore` has no dependency on a running
    /// reactor, so driving it with `futures::executor::block_on` from a
    /// plain OS thread is safe and gives both call styles one real shared
    /// primitive instead of two parallel lock implementations.
    pub fn acquire_blocking(&self, key: K) -> KeyMutexGuard<K> {
        let slot = self.slot_for(&key);
        slot.refcount.fetch_add(1, Ordering::AcqRel);
        let mut reservation = Reservation { slot: slot.clone(), armed: true };

        let permit = futures::executor::block_on(slot.semaphore.clone().acquire_owned())
            .expect("key semaphore is never closed while its slot is reachable");

        reservation.armed = false;
        KeyMutexGuard { key, slot, permit: Some(permit) }
    }

    /// Number of key-slots currently tracked (contended, recently used, or
    /// pending sweep).
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Remove any slot with zero holders/waiters whose `last_touched` age
    /// exceeds the protection window. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let stale: Vec<K> = self
            .slots
            .iter()
            .filter_map(|entry| {
                let slot = entry.value();
                if slot.refcount.load(Ordering::Acquire) != 0 {
                    return None;
                }
                let age = now.saturating_duration_since(*slot.last_touched.lock());
                if age >= self.protection_window {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();

        let mut removed = 0;
        for key in stale {
            // Re-check under removal: a concurrent acquire may have bumped
            // the refcount between the scan and now.
            if let Some((_, slot)) = self.slots.remove_if(&key, |_, slot| {
                slot.refcount.load(Ordering::Acquire) == 0
            }) {
                drop(slot);
                removed += 1;
            }
        }
        removed
    }

    /// Drop every tracked slot, forcibly releasing underlying primitives.
    pub fn dispose(&self) {
        self.slots.clear();
    }
}
