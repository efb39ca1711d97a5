//! Store fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use social_storage::{NewUser, Role, RoleStorage, StorageError, StorageResult, User, UserStorage};
use time::OffsetDateTime;

pub(crate) fn user(id: i64, role: &str, level: i32) -> User {
    User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
        password_hash: String::new(),
        role: Role::new(role, level),
        is_active: true,
        created_at: OffsetDateTime::UNIX_EPOCH,
    }
}

/// User store counting `find_by_id` calls.
#[derive(Default)]
pub(crate) struct CountingUserStore {
    users: DashMap<i64, User>,
    fetches: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl CountingUserStore {
    pub(crate) fn with_user(id: i64, role: &str, level: i32) -> Self {
        let store = Self::default();
        store.insert(user(id, role, level));
        store
    }

    pub(crate) fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_with_connection_error(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStorage for CountingUserStore {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("store offline"));
        }
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.clone()))
    }

    async fn create(&self, _user: NewUser) -> StorageResult<User> {
        Err(StorageError::internal("not supported by the test store"))
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        self.users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("user", id))
    }
}

/// Role store with a fixed role table.
pub(crate) struct StaticRoleStore {
    roles: Vec<Role>,
    fail: AtomicBool,
}

impl StaticRoleStore {
    pub(crate) fn new(roles: Vec<Role>) -> Self {
        Self {
            roles,
            fail: AtomicBool::new(false),
        }
    }

    pub(crate) fn standard() -> Self {
        Self::new(vec![
            Role::new("user", 1),
            Role::new("moderator", 2),
            Role::new("admin", 3),
        ])
    }

    pub(crate) fn fail_with_internal_error(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RoleStorage for StaticRoleStore {
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::internal("role table unreadable"));
        }
        Ok(self.roles.iter().find(|r| r.name == name).cloned())
    }
}

/// A Redis pool pointing at a closed port.
pub(crate) fn unreachable_pool() -> deadpool_redis::Pool {
    let mut config = deadpool_redis::Config::from_url("redis://127.0.0.1:1");
    let mut pool = deadpool_redis::PoolConfig::new(2);
    pool.timeouts.wait = Some(Duration::from_millis(200));
    pool.timeouts.create = Some(Duration::from_millis(200));
    config.pool = Some(pool);
    config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap()
}

/// A TCP server that accepts Redis connections and never answers.
pub(crate) struct StalledRedis {
    addr: std::net::SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl StalledRedis {
    pub(crate) async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        Self { addr, task }
    }

    /// A pool without its own timeouts, so only the caller's deadline applies.
    pub(crate) fn pool(&self) -> deadpool_redis::Pool {
        let mut config = deadpool_redis::Config::from_url(format!("redis://{}", self.addr));
        config.pool = Some(deadpool_redis::PoolConfig::new(2));
        config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap()
    }
}

impl Drop for StalledRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}
