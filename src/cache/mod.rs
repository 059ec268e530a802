//! Versioned response stores and the strategies that fill and serve them.
//!
//! - Stores are named `<version>-<role>` and live in one SQLite database
//! - Bounded stores drop their oldest-inserted entries first
//! - Requests are routed cache-first, network-first, or passed through

mod classify;
pub mod eviction;
mod registry;
mod storage;
mod strategy;
mod traits;

pub use registry::{CacheManager, StoreRole, VersionTag};
pub use storage::SqliteStorage;
pub use strategy::StrategyEngine;
pub use traits::{CacheSource, Served, StoreBackend};
