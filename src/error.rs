//! Error taxonomy for the entity cache.

use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the cache layer.
///
/// All of these propagate synchronously to the immediate caller; this layer
/// performs no retries. A failure is always signalled distinctly rather than
/// degraded into silently-wrong data (an unknown type is an error, never an
/// empty list).
#[derive(Debug, Error)]
pub enum CacheError {
  /// A type, entity or schema field mapping is absent from the cache or
  /// schema. Fatal to the calling operation.
  #[error("not found: {0}")]
  NotFound(String),

  /// A cache invariant was violated (duplicate type key in a snapshot
  /// batch, inconsistent persisted state, out-of-range id). Not
  /// recoverable at this layer.
  #[error("invariant violation: {0}")]
  InvariantViolation(String),

  /// The durable storage substrate is unavailable.
  #[error("unsupported environment: {0}")]
  UnsupportedEnvironment(String),

  /// Error from the SQLite substrate.
  #[error("storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// Entity list or query-set serialization failed.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}
