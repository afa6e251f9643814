//! Producer abstraction: the four call shapes `BlitzCache::get*` accepts,
//! collapsed into one enum so the coordinator (C6) has a single state
//! machine instead of branching over a trait-object-per-shape design (which
//! would need `async-trait` for the async variants).

use std::future::Future;
use std::pin::Pin;

use crate::error::CacheError;
use crate::nuances::Nuances;

type BoxFuture<'a, V> = Pin<Box<dyn Future<Output = Result<V, CacheError>> + Send + 'a>>;

/// A value-producing callback, in one of the four shapes the public API
/// accepts. Built by the `get`/`get_async`/`*_with_nuances` entry points and
/// consumed exactly once by the coordinator after winning the key mutex.
pub enum Producer<'a, V> {
    Sync(Box<dyn FnOnce() -> Result<V, CacheError> + Send + 'a>),
    SyncWithNuances(Box<dyn FnOnce(&Nuances) -> Result<V, CacheError> + Send + 'a>),
    Async(Box<dyn FnOnce() -> BoxFuture<'a, V> + Send + 'a>),
    AsyncWithNuances(Box<dyn FnOnce(&Nuances) -> BoxFuture<'a, V> + Send + 'a>),
}

impl<'a, V> Producer<'a, V> {
    /// Run the producer to completion, driving async variants with
    /// `futures::executor::block_on` when invoked from a synchronous call
    /// site. `nuances` is always constructed by the coordinator; variants
    /// that don't accept it simply ignore the reference.
    pub fn run_blocking(self, nuances: &Nuances) -> Result<V, CacheError> {
        match self {
            Producer::Sync(f) => f(),
            Producer::SyncWithNuances(f) => f(nuances),
            Producer::Async(f) => futures::executor::block_on(f()),
            Producer::AsyncWithNuances(f) => futures::executor::block_on(f(nuances)),
        }
    }

    /// Run the producer to completion from an async call site. Sync
    /// variants run inline — they're assumed non-blocking-cheap, matching
    /// the spec's framing of `get` producers as plain closures.
    pub async fn run_async(self, nuances: &Nuances) -> Result<V, CacheError> {
        match self {
            Producer::Sync(f) => f(),
            Producer::SyncWithNuances(f) => f(nuances),
            Producer::Async(f) => f().await,
            Producer::AsyncWithNuances(f) => f(nuances).await,
        }
    }
}
