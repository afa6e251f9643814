use thiserror::Error;

/// Errors surfaced across the public API.
///
/// `SizerFailure` and `TTLInvalid` from the design notes are handled
/// internally (fallback size, skip-insertion) and never reach a caller, so
/// they have no variant here.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("argument missing: {0}")]
    ArgumentMissing(&'static str),

    #[error("cache has been disposed")]
    Disposed,

    #[error("producer failed: {0}")]
    ProducerFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("statistics have not been initialized")]
    StatisticsUnavailable,
}

pub type Result<T> = std::result::Result<T, CacheError>;
