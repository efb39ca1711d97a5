//! In-memory storage backend for the social API.
//!
//! Implements every trait from `social-storage` on top of `DashMap`, so the
//! server and its tests run without a database.
//!
//! # Example
//!
//! ```ignore
//! use social_db_memory::InMemoryStore;
//! use social_storage::RoleStorage;
//!
//! let store = InMemoryStore::seeded();
//! let admin = store.find_by_name("admin").await?;
//! ```

pub mod storage;

pub use social_storage::{StorageError, StorageResult};
pub use storage::{InMemoryStore, standard_roles};

/// Type alias for a shareable in-memory store.
pub type SharedStore = std::sync::Arc<InMemoryStore>;

/// Creates a store seeded with the standard role table.
pub fn create_store() -> SharedStore {
    std::sync::Arc::new(InMemoryStore::seeded())
}
