//! Error types for cache operations.

use crate::value::ValueKind;

/// A single key that failed inside a batch operation.
#[derive(Debug, Clone)]
pub struct KeyFailure {
    /// The key that could not be written.
    pub key: String,
    /// Why the write failed.
    pub error: Box<CacheError>,
}

impl KeyFailure {
    pub fn new(key: impl Into<String>, error: CacheError) -> Self {
        Self {
            key: key.into(),
            error: Box::new(error),
        }
    }
}

/// Errors returned by the cache manager and its backends.
///
/// Plain absence is not an error on most read paths; [`CacheError::NotFound`]
/// is only produced by APIs that require a value to exist.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key is absent or expired.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// A numeric operation was applied to a non-integer value.
    #[error("Type mismatch for key {key}: expected integer, found {found}")]
    TypeMismatch {
        /// The key holding the value.
        key: String,
        /// The kind actually stored.
        found: ValueKind,
    },

    /// A counter update would leave the signed 64-bit range.
    #[error("Counter overflow for key {key}: {current} + {delta} is out of range")]
    Overflow {
        /// The counter key.
        key: String,
        /// The stored value before the update.
        current: i64,
        /// The requested delta.
        delta: i64,
    },

    /// The glob pattern could not be parsed.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Inserting a new key would exceed the configured entry bound.
    #[error("Cache capacity exceeded: limit is {limit} entries")]
    CapacityExceeded {
        /// The configured bound.
        limit: usize,
    },

    /// The request region is unknown or has been cleared.
    #[error("Request cache not found: {request_id}")]
    RegionNotFound {
        /// The request identifier.
        request_id: String,
    },

    /// Some keys in a batch write failed; the rest were applied.
    #[error("Batch partially applied: {applied} keys written, {} failed", failed.len())]
    PartialBatch {
        /// Number of keys written successfully.
        applied: usize,
        /// Keys that failed, with their errors.
        failed: Vec<KeyFailure>,
    },

    /// The cache configuration is invalid.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `TypeMismatch` error.
    #[must_use]
    pub fn type_mismatch(key: impl Into<String>, found: ValueKind) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            found,
        }
    }

    /// Creates a new `Overflow` error.
    #[must_use]
    pub fn overflow(key: impl Into<String>, current: i64, delta: i64) -> Self {
        Self::Overflow {
            key: key.into(),
            current,
            delta,
        }
    }

    /// Creates a new `InvalidPattern` error.
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `CapacityExceeded` error.
    #[must_use]
    pub fn capacity_exceeded(limit: usize) -> Self {
        Self::CapacityExceeded { limit }
    }

    /// Creates a new `RegionNotFound` error.
    #[must_use]
    pub fn region_not_found(request_id: impl Into<String>) -> Self {
        Self::RegionNotFound {
            request_id: request_id.into(),
        }
    }

    /// Creates a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a type mismatch error.
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    /// Returns `true` if this is a counter overflow error.
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }

    /// Returns `true` if this is a capacity error.
    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Returns `true` if this is a region not found error.
    #[must_use]
    pub fn is_region_not_found(&self) -> bool {
        matches!(self, Self::RegionNotFound { .. })
    }
}
