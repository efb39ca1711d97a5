//! Role name to precedence resolution.

use std::sync::Arc;

use social_storage::{Role, RoleStorage, StorageError, StorageResult};

/// Looks up roles in the role table. Lookups are not cached.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn RoleStorage>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn RoleStorage>) -> Self {
        Self { store }
    }

    /// Resolves a role by name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown role and propagates
    /// store failures unchanged.
    pub async fn resolve(&self, name: &str) -> StorageResult<Role> {
        self.store
            .find_by_name(name)
            .await?
            .ok_or_else(|| StorageError::not_found("role", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StaticRoleStore;

    #[tokio::test]
    async fn test_resolve_known_role() {
        let resolver = RoleResolver::new(Arc::new(StaticRoleStore::standard()));
        let role = resolver.resolve("moderator").await.unwrap();
        assert_eq!(role.level, 2);
    }

    #[tokio::test]
    async fn test_resolve_unknown_role() {
        let resolver = RoleResolver::new(Arc::new(StaticRoleStore::standard()));
        let err = resolver.resolve("superuser").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = StaticRoleStore::standard();
        store.fail_with_internal_error();
        let resolver = RoleResolver::new(Arc::new(store));
        let err = resolver.resolve("admin").await.unwrap_err();
        assert!(matches!(err, StorageError::Internal { .. }));
    }
}
