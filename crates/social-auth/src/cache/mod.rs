//! User caching.
//!
//! - **L1 (DashMap)**: in-memory, per instance
//! - **L2 (Redis)**: shared across instances, optional
//! - **Pub/Sub**: cross-instance L1 invalidation
//!
//! If Redis is unavailable or disabled the server runs in L1-only mode.

pub mod backend;
pub mod pubsub;
pub mod user;

pub use backend::{BackendStats, CacheBackend, CacheError, CachedEntry};
pub use pubsub::{CacheInvalidationListener, INVALIDATION_CHANNEL};
pub use user::{UserCache, UserCacheStats};
