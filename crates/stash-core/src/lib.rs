//! # stash-core
//!
//! Shared types for the stash cache manager.
//!
//! This crate defines the value model, error type, glob pattern matcher and
//! the [`CacheBackend`] trait. It contains no storage implementation; the
//! in-memory engine and the manager façade live in `stash-cache`.
//!
//! ## Example
//!
//! ```
//! use stash_core::{CacheValue, GlobPattern};
//!
//! let pattern = GlobPattern::parse("cache:user:*").unwrap();
//! assert!(pattern.matches("cache:user:1"));
//! assert_eq!(CacheValue::from(5).as_integer(), Some(5));
//! ```

mod backend;
mod error;
pub mod pattern;
mod value;

pub use backend::{CacheBackend, CacheStats, EntryInfo, PurgeBatch, Ttl};
pub use error::{CacheError, KeyFailure};
pub use pattern::GlobPattern;
pub use value::{CacheValue, ValueKind};

/// Type alias for a cache result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Type alias for a shared backend trait object.
pub type DynBackend = std::sync::Arc<dyn CacheBackend>;
