//! BlitzCache: an in-process, thread-safe cache that collapses concurrent
//! misses for the same key into a single producer call (the cache-stampede
//! / thundering-herd problem), with per-entry TTL, capacity-bounded
//! size-aware eviction, and optional live statistics.
//!
//! The typical entry point is [`BlitzCache::new`] for an owned instance, or
//! [`global`] for a process-wide shared instance.

pub mod capacity;
pub mod cleanup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod global;
pub mod mutex_registry;
pub mod nuances;
pub mod producer;
pub mod sizer;
pub mod stats;
pub mod store;

pub use config::{CacheConfig, EvictionStrategy, SizerMode, SizerOptions};
pub use coordinator::BlitzCache;
pub use error::{CacheError, Result};
pub use global::{global, GlobalHandle};
pub use nuances::Nuances;
pub use sizer::{DefaultSizer, HeapSize, ValueSizer};
pub use stats::StatisticsSnapshot;
pub use store::EvictionReason;
