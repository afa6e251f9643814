use std::sync::OnceLock;
use std::time::Duration;

/// Scratch object handed to a producer so it can override the TTL of the
/// entry it is about to produce, out-of-band from its return value.
///
/// A producer calls [`Nuances::set_cache_retention`] at most meaningfully
/// once; the coordinator reads it after the producer returns. A second call
/// is a last-writer-loses no-op (the first value sticks) rather than a
/// panic, since producers are caller code we don't want to crash the cache
/// over.
#[derive(Debug, Default)]
pub struct Nuances {
    cache_retention: OnceLock<Duration>,
}

impl Nuances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the entry about to be produced be cached for `retention`
    /// instead of the instance's default or the caller's `ttl` argument.
    pub fn set_cache_retention(&self, retention: Duration) {
        if self.cache_retention.set(retention).is_err() {
            tracing::trace!("Nuances::set_cache_retention called more than once; ignoring");
        }
    }

    pub fn cache_retention(&self) -> Option<Duration> {
        self.cache_retention.get().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_by_default() {
        let nuances = Nuances::new();
        assert_eq!(nuances.cache_retention(), None);
    }

    #[test]
    fn first_write_wins() {
        let nuances = Nuances::new();
        nuances.set_cache_retention(Duration::from_secs(5));
        nuances.set_cache_retention(Duration::from_secs(99));
        assert_eq!(nuances.cache_retention(), Some(Duration::from_secs(5)));
    }
}
