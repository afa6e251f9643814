use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Traversal depth/breadth used when estimating a value's byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizerMode {
    /// Shallow, skips traversal of references.
    Fast,
    /// One level of traversal. Default.
    Balanced,
    /// Heuristic: cheap for simple values, deeper for composite ones.
    Adaptive,
    /// Deepest traversal, respecting `max_depth`/`max_objects`.
    Accurate,
}

impl Default for SizerMode {
    fn default() -> Self {
        SizerMode::Balanced
    }
}

/// Which entries the capacity enforcer removes first when over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionStrategy {
    /// Evict ascending by `size_bytes` (tie-break: older `created_at` first).
    SmallestFirst,
    /// Evict descending by `size_bytes` (tie-break: older `created_at` first).
    LargestFirst,
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        EvictionStrategy::SmallestFirst
    }
}

/// Knobs for the value sizer (C3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizerOptions {
    pub mode: SizerMode,
    pub max_depth: usize,
    pub max_objects: usize,
    pub reflect_into_structs: bool,
}

impl Default for SizerOptions {
    fn default() -> Self {
        Self {
            mode: SizerMode::default(),
            max_depth: 3,
            max_objects: 512,
            reflect_into_structs: true,
        }
    }
}

/// Configuration for a [`crate::BlitzCache`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when neither the per-call `ttl` nor Nuances override it.
    pub default_ttl: Duration,
    /// Tick interval for the periodic cleanup task (C7).
    pub cleanup_interval: Duration,
    /// Minimum age a zero-refcount KeyMutex must reach before the sweep
    /// removes it. Prevents thrashing under bursty key reuse.
    pub protection_window: Duration,
    /// Size of the top-slowest-producer tracker. 0 disables it.
    pub max_top_slowest: usize,
    /// Size of the top-heaviest-entry tracker. 0 disables it.
    pub max_top_heaviest: usize,
    /// Total estimated bytes allowed before the capacity enforcer runs.
    /// `None` disables capacity enforcement.
    pub max_cache_size_bytes: Option<u64>,
    /// Eviction order used by the capacity enforcer.
    pub eviction_strategy: EvictionStrategy,
    /// Value sizer traversal knobs.
    pub sizer_options: SizerOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(1),
            protection_window: Duration::from_secs(1),
            max_top_slowest: 10,
            max_top_heaviest: 10,
            max_cache_size_bytes: None,
            eviction_strategy: EvictionStrategy::default(),
            sizer_options: SizerOptions::default(),
        }
    }
}

impl CacheConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_protection_window(mut self, window: Duration) -> Self {
        self.protection_window = window;
        self
    }

    pub fn with_max_top_slowest(mut self, n: usize) -> Self {
        self.max_top_slowest = n;
        self
    }

    pub fn with_max_top_heaviest(mut self, n: usize) -> Self {
        self.max_top_heaviest = n;
        self
    }

    pub fn with_max_cache_size_bytes(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = Some(bytes);
        self
    }

    pub fn with_eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = strategy;
        self
    }

    pub fn with_sizer_options(mut self, options: SizerOptions) -> Self {
        self.sizer_options = options;
        self
    }

    /// Build a config from `BLITZCACHE_*` environment variables, falling
    /// back to [`CacheConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BLITZCACHE_DEFAULT_TTL_MS")
            && let Ok(ms) = val.parse::<u64>() {
                config.default_ttl = Duration::from_millis(ms);
            }

        if let Ok(val) = std::env::var("BLITZCACHE_CLEANUP_INTERVAL_MS")
            && let Ok(ms) = val.parse::<u64>() {
                config.cleanup_interval = Duration::from_millis(ms);
            }

        if let Ok(val) = std::env::var("BLITZCACHE_PROTECTION_WINDOW_MS")
            && let Ok(ms) = val.parse::<u64>() {
                config.protection_window = Duration::from_millis(ms);
            }

        if let Ok(val) = std::env::var("BLITZCACHE_MAX_TOP_SLOWEST")
            && let Ok(n) = val.parse::<usize>() {
                config.max_top_slowest = n;
            }

        if let Ok(val) = std::env::var("BLITZCACHE_MAX_TOP_HEAVIEST")
            && let Ok(n) = val.parse::<usize>() {
                config.max_top_heaviest = n;
            }

        if let Ok(val) = std::env::var("BLITZCACHE_MAX_CACHE_SIZE_BYTES")
            && let Ok(bytes) = val.parse::<u64>() {
                config.max_cache_size_bytes = if bytes == 0 { None } else { Some(bytes) };
            }

        if let Ok(val) = std::env::var("BLITZCACHE_EVICTION_STRATEGY") {
            config.eviction_strategy = match val.to_lowercase().as_str() {
                "largest_first" => EvictionStrategy::LargestFirst,
                "smallest_first" => EvictionStrategy::SmallestFirst,
                _ => config.eviction_strategy,
            };
        }

        if let Ok(val) = std::env::var("BLITZCACHE_SIZER_MODE") {
            config.sizer_options.mode = match val.to_lowercase().as_str() {
                "fast" => SizerMode::Fast,
                "balanced" => SizerMode::Balanced,
                "adaptive" => SizerMode::Adaptive,
                "accurate" => SizerMode::Accurate,
                _ => config.sizer_options.mode,
            };
        }

        if let Ok(val) = std::env::var("BLITZCACHE_SIZER_MAX_DEPTH")
            && let Ok(depth) = val.parse::<usize>() {
                config.sizer_options.max_depth = depth;
            }

        if let Ok(val) = std::env::var("BLITZCACHE_SIZER_MAX_OBJECTS")
            && let Ok(n) = val.parse::<usize>() {
                config.sizer_options.max_objects = n;
            }

        config
    }
}
