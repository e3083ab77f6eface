//! Generic caching layer for slow-changing remote data.
//!
//! This module knows nothing about Jira. It:
//! - Stores one serialized value per cache key
//! - Serves fresh entries without touching the network
//! - Provides basic offline mode (serve stale cache when network unavailable)

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedBlob, MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, QueryKey};
