//! C4 — size-aware capacity enforcement.
//!
//! Grounded on `src/cache/ttl_cache.rs`'s `handle_memory_pressure_eviction`/
//! `emergency_memory_eviction` (collect `(key, priority)` pairs from a
//! snapshot, sort, evict the front slice).

use std::hash::Hash;

use crate::config::EvictionStrategy;
use crate::store::{EntryStore, EvictionReason};

/// Evict entries from `store` per `strategy` until `approximate_memory_bytes`
/// (tracked by the caller via `store`'s own eviction callbacks) would fall
/// at or below `max_bytes`, or the snapshot is exhausted.
///
/// Ties in `size_bytes` break by older `created_at` first for both
/// strategies (see DESIGN.md open-question resolution #2).
///
/// Returns the number of entries evicted.
pub fn enforce<K, V>(
    store: &EntryStore<K, V>,
    strategy: EvictionStrategy,
    current_bytes: u64,
    max_bytes: u64,
) -> usize
where
    K: Eq + Hash + Clone,
{
    if current_bytes <= max_bytes {
        return 0;
    }

    let mut snapshot = store.iter_snapshot();
    match strategy {
        EvictionStrategy::SmallestFirst => {
            snapshot.sort_by(|a, b| {
                a.size_bytes.cmp(&b.size_bytes).then(a.created_at.cmp(&b.created_at))
            });
        }
        EvictionStrategy::LargestFirst => {
            snapshot.sort_by(|a, b| {
                b.size_bytes.cmp(&a.size_bytes).then(a.created_at.cmp(&b.created_at))
            });
        }
    }

    let mut remaining = current_bytes;
    let mut evicted = 0;
    for entry in snapshot {
        if remaining <= max_bytes {
            break;
        }
        if store.remove_with_reason(&entry.key, EvictionReason::Capacity) {
            remaining = remaining.saturating_sub(entry.size_bytes);
            evicted += 1;
        }
    }
    evicted
}
