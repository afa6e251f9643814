//! C5 — accounting and statistics.
//!
//! Split into two pieces per the spec's "capacity enforcement must make
//! progress even when statistics are disabled" requirement:
//!
//! - [`Accounting`] is always-on: plain atomics, no allocation, populated on
//!   every `set`/`remove`/eviction regardless of whether the caller ever
//!   calls `InitializeStatistics`.
//! - [`Statistics`] is optional and heavier (hit/miss counters plus bounded
//!   top-K trackers under a lock); it is only constructed after
//!   `InitializeStatistics` and is stored behind a `OnceLock` by the
//!   coordinator.
//!
//! Grounded on `src/cache/ttl_cache.rs`'s `CacheStats` (atomics +
//! `hit_rate`/`average_entry_size` derived accessors) and on
//! `examples/other_examples/8c13418b_rawkode-cuenv__src-cache-concurrent-mod.rs.rs`'s
//! split between an atomics struct and a serde-derived snapshot struct.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Always-on gauges needed by capacity enforcement. Never behind a
/// `OnceLock` — these must be available even when statistics were never
/// initialized.
#[derive(Default)]
pub struct Accounting {
    entry_count: AtomicU64,
    approximate_memory_bytes: AtomicU64,
    eviction_count: AtomicU64,
}

impl Accounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&self, size_bytes: u64) {
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        self.approximate_memory_bytes.fetch_add(size_bytes, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, size_bytes: u64) {
        self.entry_count.fetch_sub(1, Ordering::Relaxed);
        self.approximate_memory_bytes.fetch_sub(size_bytes, Ordering::Relaxed);
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn approximate_memory_bytes(&self) -> u64 {
        self.approximate_memory_bytes.load(Ordering::Relaxed)
    }

    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }
}

/// One entry in a bounded top-K tracker, generic over what's being ranked
/// (slowest producer runs, heaviest entries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry<K> {
    pub key: K,
    pub metric: u64,
}

/// Keeps the `capacity` highest-`metric` entries seen, evicting the smallest
/// when full. `capacity == 0` disables tracking entirely (every `offer` is a
/// no-op), matching `CacheConfig::max_top_slowest`/`max_top_heaviest == 0`.
pub struct BoundedTopK<K> {
    capacity: usize,
    entries: Vec<RankedEntry<K>>,
}

impl<K: Clone> BoundedTopK<K> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::with_capacity(capacity) }
    }

    pub fn offer(&mut self, key: K, metric: u64) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(RankedEntry { key, metric });
            self.entries.sort_by(|a, b| b.metric.cmp(&a.metric));
            return;
        }
        if let Some(smallest) = self.entries.last() {
            if metric > smallest.metric {
                self.entries.pop();
                self.entries.push(RankedEntry { key, metric });
                self.entries.sort_by(|a, b| b.metric.cmp(&a.metric));
            }
        }
    }

    pub fn snapshot(&self) -> Vec<RankedEntry<K>> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Optional hit/miss counters and top-K trackers, created only after
/// `InitializeStatistics` is called on the owning cache.
pub struct Statistics<K> {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    slowest_producers: Mutex<BoundedTopK<K>>,
    heaviest_entries: Mutex<BoundedTopK<K>>,
}

impl<K: Clone> Statistics<K> {
    pub fn new(max_top_slowest: usize, max_top_heaviest: usize) -> Self {
        Self {
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            slowest_producers: Mutex::new(BoundedTopK::new(max_top_slowest)),
            heaviest_entries: Mutex::new(BoundedTopK::new(max_top_heaviest)),
        }
    }

    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_production(&self, key: K, duration: Duration) {
        self.slowest_producers.lock().offer(key, duration.as_micros() as u64);
    }

    pub fn record_entry_size(&self, key: K, size_bytes: u64) {
        self.heaviest_entries.lock().offer(key, size_bytes);
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }

    /// Zero the counters and top-K trackers. Gauges living in [`Accounting`]
    /// are untouched — they reflect present state, not accumulated history.
    pub fn reset(&self) {
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
        self.slowest_producers.lock().clear();
        self.heaviest_entries.lock().clear();
    }

    pub fn snapshot(&self, accounting: &Accounting, active_key_mutex_count: u64) -> StatisticsSnapshot<K> {
        let hits = self.hit_count();
        let misses = self.miss_count();
        let total = hits + misses;
        StatisticsSnapshot {
            hit_count: hits,
            miss_count: misses,
            total_operations: total,
            hit_ratio: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            entry_count: accounting.entry_count(),
            approximate_memory_bytes: accounting.approximate_memory_bytes(),
            eviction_count: accounting.eviction_count(),
            active_key_mutex_count,
            slowest_producers: self.slowest_producers.lock().snapshot(),
            heaviest_entries: self.heaviest_entries.lock().snapshot(),
        }
    }
}

/// Serializable point-in-time view of a cache's statistics, returned by
/// `BlitzCache::statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSnapshot<K> {
    pub hit_count: u64,
    pub miss_count: u64,
    pub total_operations: u64,
    pub hit_ratio: f64,
    pub entry_count: u64,
    pub approximate_memory_bytes: u64,
    pub eviction_count: u64,
    /// Sampled from C1 (the keyed-mutex registry) at snapshot time, not
    /// tracked as a running counter like the other fields.
    pub active_key_mutex_count: u64,
    pub slowest_producers: Vec<RankedEntry<K>>,
    pub heaviest_entries: Vec<RankedEntry<K>>,
}

#[allow(dead_code)]
fn assert_hashable<K: Eq + Hash>() {}
