//! C2 — keyed entry map with TTL expiration and eviction-callback accounting.
//!
//! Grounded on `src/cache/ttl_cache.rs`'s `TtlCache`/`CacheEntry` shape,
//! rebuilt over `dashmap::DashMap` for lock-free per-key access (following
//! the concurrent-map idiom in
//! `examples/other_examples/8c13418b_rawkode-cuenv__src-cache-concurrent-mod.rs.rs`)
//! instead of the teacher's single `RwLock<HashMap>`.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Why an entry left the store. Carried to the eviction callback exactly
/// once per successfully inserted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,
    Manual,
    Capacity,
    Disposed,
}

pub type EvictionCallback<K> = Arc<dyn Fn(&K, EvictionReason) + Send + Sync>;

pub(crate) struct StoredEntry<K, V> {
    pub value: Arc<V>,
    pub size_bytes: u64,
    pub absolute_expiry: Instant,
    pub created_at: Instant,
    pub production_duration: Duration,
    pub on_evict: EvictionCallback<K>,
}

/// A present entry's public-facing snapshot, returned by `iter_snapshot`.
pub struct EntrySnapshot<K, V> {
    pub key: K,
    pub value: Arc<V>,
    pub size_bytes: u64,
    pub created_at: Instant,
    pub production_duration: Duration,
}

pub struct EntryStore<K, V> {
    entries: DashMap<K, StoredEntry<K, V>>,
    disposed: std::sync::atomic::AtomicBool,
}

impl<K, V> EntryStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            disposed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Look up `key`, evicting and reporting `EvictionReason::Expired` if
    /// the TTL has elapsed.
    pub fn try_get(&self, key: &K) -> Option<Arc<V>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.absolute_expiry > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.remove_with_reason(key, EvictionReason::Expired);
        }
        None
    }

    /// Insert or overwrite `key`. `ttl` must be positive; callers enforce
    /// the "ttl <= 0 means don't cache" rule before calling `set` (see
    /// `BlitzCache::run`), so this is a hard invariant here, not a
    /// recoverable error.
    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &self,
        key: K,
        value: Arc<V>,
        ttl: Duration,
        size_bytes: u64,
        production_duration: Duration,
        on_evict: EvictionCallback<K>,
    ) -> Option<Arc<V>> {
        debug_assert!(ttl > Duration::ZERO, "entry store requires a positive TTL");
        let now = Instant::now();
        let entry = StoredEntry {
            value: value.clone(),
            size_bytes,
            absolute_expiry: now + ttl,
            created_at: now,
            production_duration,
            on_evict,
        };

        // A displaced entry is evicted by direct caller action (a fresh
        // `set`/`Update`), not by the capacity enforcer, so it is reported
        // as `Manual` rather than `Capacity`.
        let previous = self.entries.insert(key.clone(), entry);
        if let Some(previous) = previous {
            (previous.on_evict)(&key, EvictionReason::Manual);
            return Some(previous.value);
        }
        None
    }

    /// Remove `key` if present, firing its callback with `Manual`. No-op if
    /// absent.
    pub fn remove(&self, key: &K) -> bool {
        self.remove_with_reason(key, EvictionReason::Manual)
    }

    /// Remove `key` if present, firing its callback with the given `reason`.
    /// Used by the capacity enforcer so evictions it performs are reported
    /// as `Capacity` rather than the default `Manual`.
    pub fn remove_with_reason(&self, key: &K, reason: EvictionReason) -> bool {
        if let Some((_, entry)) = self.entries.remove(key) {
            (entry.on_evict)(key, reason);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A consistent-at-point-in-time view of present entries, used by the
    /// capacity enforcer to choose eviction candidates.
    pub fn iter_snapshot(&self) -> Vec<EntrySnapshot<K, V>> {
        self.entries
            .iter()
            .map(|entry| EntrySnapshot {
                key: entry.key().clone(),
                value: entry.value.clone(),
                size_bytes: entry.size_bytes,
                created_at: entry.created_at,
                production_duration: entry.production_duration,
            })
            .collect()
    }

    /// Remove every entry, firing each callback with `Disposed`.
    pub fn dispose(&self) {
        self.disposed.store(true, std::sync::atomic::Ordering::Release);
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.remove_with_reason(&key, EvictionReason::Disposed);
        }
    }
}

impl<K, V> Default for EntryStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn noop_callback<K>() -> EvictionCallback<K> {
        Arc::new(|_, _| {})
    }

    #[test]
    fn insert_then_get_hits() {
        let store: EntryStore<&str, String> = EntryStore::new();
        store.set(
            "k",
            Arc::new("v".to_string()),
            Duration::from_secs(10),
            1,
            Duration::ZERO,
            noop_callback(),
        );
        assert_eq!(*store.try_get(&"k").unwrap(), "v");
    }

    #[test]
    fn expired_entry_misses_and_fires_callback_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        let store: EntryStore<&str, String> = EntryStore::new();
        store.set(
            "k",
            Arc::new("v".to_string()),
            Duration::from_millis(10),
            1,
            Duration::ZERO,
            Arc::new(move |_, reason| {
                assert_eq!(reason, EvictionReason::Expired);
                fired2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        std::thread::sleep(Duration::from_millis(30));
        assert!(store.try_get(&"k").is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // A second probe after the entry is already gone must not refire.
        assert!(store.try_get(&"k").is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_fires_manual_reason() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen2 = seen.clone();
        let store: EntryStore<&str, String> = EntryStore::new();
        store.set(
            "k",
            Arc::new("v".to_string()),
            Duration::from_secs(10),
            1,
            Duration::ZERO,
            Arc::new(move |_, reason| *seen2.lock().unwrap() = Some(reason)),
        );
        assert!(store.remove(&"k"));
        assert_eq!(*seen.lock().unwrap(), Some(EvictionReason::Manual));
        assert!(!store.remove(&"k"));
    }

    #[test]
    fn overwrite_fires_previous_callback_exactly_once() {
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        let store: EntryStore<&str, String> = EntryStore::new();
        let cb: EvictionCallback<&str> = Arc::new(move |_, _| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        store.set("k", Arc::new("v1".into()), Duration::from_secs(10), 1, Duration::ZERO, cb.clone());
        store.set("k", Arc::new("v2".into()), Duration::from_secs(10), 1, Duration::ZERO, cb);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*store.try_get(&"k").unwrap(), "v2");
    }

    #[test]
    fn dispose_fires_all_callbacks_once_and_empties_store() {
        let count = Arc::new(AtomicU32::new(0));
        let store: EntryStore<&str, String> = EntryStore::new();
        for k in ["a", "b", "c"] {
            let count2 = count.clone();
            store.set(
                k,
                Arc::new(k.to_string()),
                Duration::from_secs(10),
                1,
                Duration::ZERO,
                Arc::new(move |_, reason| {
                    assert_eq!(reason, EvictionReason::Disposed);
                    count2.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        store.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(store.len(), 0);
        assert!(store.is_disposed());
    }

    #[test]
    fn iter_snapshot_reflects_present_entries() {
        let store: EntryStore<&str, String> = EntryStore::new();
        store.set("a", Arc::new("1".into()), Duration::from_secs(10), 4, Duration::ZERO, noop_callback());
        store.set("b", Arc::new("2".into()), Duration::from_secs(10), 8, Duration::ZERO, noop_callback());
        let mut snapshot = store.iter_snapshot();
        snapshot.sort_by_key(|e| e.key);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].size_bytes, 4);
        assert_eq!(snapshot[1].size_bytes, 8);
    }
}
