//! Process-wide shared cache instance (`use_global_instance` in the spec's
//! configuration surface).
//!
//! The teacher's `static GLOBAL_CACHE_MANAGER: OnceLock<MemoryAwareCacheManager>`
//! is monomorphic — one manager type, one static. `BlitzCache<K, V>` is
//! generic, and a `static` item cannot reference a generic parameter of an
//! enclosing function, so "one static per type" has to be built explicitly:
//! a registry keyed by `TypeId::of::<(K, V)>()`, guarded by a `RwLock` with
//! a read-fast-path / write-slow-path, following the same lazy-singleton
//! shape as the teacher's `OnceLock` but generalized across types.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::config::CacheConfig;
use crate::coordinator::BlitzCache;
use crate::error::Result;
use crate::sizer::HeapSize;
use crate::stats::StatisticsSnapshot;

type Registry = RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static INSTANCES: Lazy<Registry> = Lazy::new(|| RwLock::new(HashMap::new()));

/// A handle to the process-wide `BlitzCache<K, V>` instance. Deliberately
/// does not `Deref` to `BlitzCache` — that would expose `dispose()` on a
/// cache every caller shares, so only the operations a global instance
/// should support are forwarded explicitly. Disposing it from user code is
/// rejected at the type level rather than by a runtime check.
#[derive(Clone, Copy)]
pub struct GlobalHandle<K, V>(&'static BlitzCache<K, V>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: HeapSize + Send + Sync + 'static;

impl<K, V> GlobalHandle<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: HeapSize + Send + Sync + 'static,
{
    /// The raw shared instance, for callers that need `std::ptr::eq`-style
    /// identity checks (tests, diagnostics). Not a `Deref` impl: see the
    /// type-level note above.
    pub fn instance(&self) -> &'static BlitzCache<K, V> {
        self.0
    }

    pub fn get(&self, key: K, producer: impl FnOnce() -> Result<V> + Send + '_, ttl: Option<Duration>) -> Result<Arc<V>> {
        self.0.get(key, producer, ttl)
    }

    pub async fn get_async<F>(&self, key: K, producer: impl FnOnce() -> F + Send + '_, ttl: Option<Duration>) -> Result<Arc<V>>
    where
        F: Future<Output = Result<V>> + Send + 'static,
    {
        self.0.get_async(key, producer, ttl).await
    }

    pub fn update(&self, key: K, producer: impl FnOnce() -> Result<V> + Send + '_, ttl: Duration) -> Result<Arc<V>> {
        self.0.update(key, producer, ttl)
    }

    pub fn remove(&self, key: &K) -> Result<()> {
        self.0.remove(key)
    }

    pub fn statistics(&self) -> Option<StatisticsSnapshot<K>> {
        self.0.statistics()
    }
}

/// Returns the process-wide `BlitzCache<K, V>` instance, creating it with
/// `CacheConfig::default()` on first use. One instance is shared per
/// distinct `(K, V)` pair; a different pair gets its own instance and its
/// own key-mutex registry and entry store.
pub fn global<K, V>() -> GlobalHandle<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: HeapSize + Send + Sync + 'static,
{
    let type_id = TypeId::of::<(K, V)>();

    if let Some(existing) = INSTANCES.read().unwrap().get(&type_id) {
        return GlobalHandle(*existing.downcast_ref::<&'static BlitzCache<K, V>>().unwrap());
    }

    let mut instances = INSTANCES.write().unwrap();
    // Re-check: another thread may have won the race between the read
    // unlock above and this write lock.
    if let Some(existing) = instances.get(&type_id) {
        return GlobalHandle(*existing.downcast_ref::<&'static BlitzCache<K, V>>().unwrap());
    }

    let leaked: &'static BlitzCache<K, V> = Box::leak(Box::new(BlitzCache::new(CacheConfig::default())));
    instances.insert(type_id, Box::new(leaked));
    GlobalHandle(leaked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn repeated_calls_return_the_same_instance() {
        let a = global::<&'static str, i32>();
        let b = global::<&'static str, i32>();
        assert!(std::ptr::eq(a.instance(), b.instance()));
    }

    #[test]
    fn distinct_type_pairs_get_distinct_instances() {
        let a = global::<&'static str, i32>();
        let b = global::<&'static str, u64>();
        assert!(!std::ptr::eq(a.instance() as *const _ as *const (), b.instance() as *const _ as *const ()));
    }

    #[test]
    fn concurrent_first_access_still_yields_one_instance() {
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let seen_ptrs: Arc<std::sync::Mutex<Vec<usize>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let barrier = barrier.clone();
                let seen_ptrs = seen_ptrs.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    calls.fetch_add(1, Ordering::SeqCst);
                    let handle = global::<String, i32>();
                    seen_ptrs.lock().unwrap().push(handle.instance() as *const _ as usize);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ptrs = seen_ptrs.lock().unwrap();
        assert!(ptrs.iter().all(|p| *p == ptrs[0]));
    }
}
