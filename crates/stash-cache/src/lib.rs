//! # stash-cache
//!
//! Layered in-process cache manager.
//!
//! ## Architecture
//!
//! ```text
//!                      CacheManager
//!        ┌──────────────────┼───────────────────┐
//!        ▼                  ▼                   ▼
//!   MemoryStore       RegionRegistry         Sweeper
//!   (DashMap)         (DashMap of regions)   (tokio task)
//!   ├─ ExpiryIndex                              │
//!   ├─ counters                                 │
//!   └─ pattern invalidation ◀── purge_expired ──┤
//!                       ◀──── reclaim_idle ─────┘
//! ```
//!
//! - **Global keyspace**: TTL entries with lazy expiry on read, atomic
//!   counters, batch get/set and `*` glob invalidation.
//! - **Request regions**: isolated, non-expiring maps keyed by request id,
//!   released explicitly or reclaimed after sitting idle.
//! - **Sweeper**: background task that drains expired deadlines in bounded
//!   batches and reclaims idle regions.

mod batch;
pub mod config;
mod counter;
mod expiry;
pub mod manager;
pub mod observability;
pub mod region;
pub mod store;
pub mod sweeper;

pub use config::{AppConfig, BackendKind, CacheConfig, LoggingConfig};
pub use manager::{CacheManager, ManagerStats};
pub use region::{RegionRegistry, RegionStats, RequestCache};
pub use store::MemoryStore;
pub use sweeper::{SweepReport, SweeperConfig};

pub use stash_core::{
    CacheBackend, CacheError, CacheResult, CacheStats, CacheValue, EntryInfo, GlobPattern,
    KeyFailure, PurgeBatch, Ttl, ValueKind,
};
