use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use social_storage::{
    Comment, CommentStorage, FollowerStorage, Invitation, InvitationStorage, NewComment,
    NewPost, NewUser, Post, PostId, PostPatch, PostStorage, Role, RoleStorage, StorageError,
    StorageResult, User, UserId, UserStorage,
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Monotonic id sequence, starting at 1.
#[derive(Debug)]
struct Sequence(AtomicI64);

impl Sequence {
    fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// In-memory social storage backed by `DashMap`.
///
/// This storage implementation provides:
/// - Concurrent access with per-shard locking
/// - Every store trait the gatekeeper and handlers consume
/// - Optimistic concurrency on posts through a version counter
/// - Unique emails and usernames
#[derive(Debug)]
pub struct InMemoryStore {
    users: DashMap<UserId, User>,
    roles: DashMap<String, Role>,
    posts: DashMap<PostId, Post>,
    comments: DashMap<i64, Comment>,
    /// (follower, followed) -> followed since
    follows: DashMap<(UserId, UserId), OffsetDateTime>,
    /// token hash -> pending activation
    invitations: DashMap<String, Invitation>,
    user_ids: Sequence,
    post_ids: Sequence,
    comment_ids: Sequence,
    /// Serializes user creation so uniqueness checks and inserts are atomic.
    user_writes: Mutex<()>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store without roles.
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            roles: DashMap::new(),
            posts: DashMap::new(),
            comments: DashMap::new(),
            follows: DashMap::new(),
            invitations: DashMap::new(),
            user_ids: Sequence::new(),
            post_ids: Sequence::new(),
            comment_ids: Sequence::new(),
            user_writes: Mutex::new(()),
        }
    }

    /// Creates a store holding the standard role table.
    pub fn seeded() -> Self {
        let store = Self::new();
        for role in standard_roles() {
            store.insert_role(role);
        }
        store
    }

    /// Adds or replaces a role.
    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Whether `follower` currently follows `followed`.
    pub fn is_following(&self, follower: UserId, followed: UserId) -> bool {
        self.follows.contains_key(&(follower, followed))
    }
}

/// The role table every deployment starts with.
pub fn standard_roles() -> Vec<Role> {
    vec![
        Role::new("user", 1).with_description("A user can create posts and comments"),
        Role::new("moderator", 2).with_description("A moderator can update other users posts"),
        Role::new("admin", 3).with_description("An admin can update and delete other users posts"),
    ]
}

#[async_trait]
impl UserStorage for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.clone()))
    }

    async fn create(&self, user: NewUser) -> StorageResult<User> {
        if user.username.trim().is_empty() || user.email.trim().is_empty() {
            return Err(StorageError::invalid("username and email are required"));
        }
        let role = self
            .roles
            .get(&user.role_name)
            .map(|r| r.clone())
            .ok_or_else(|| StorageError::not_found("role", &user.role_name))?;

        let _guard = self.user_writes.lock().await;
        let taken = self.users.iter().find_map(|existing| {
            if existing.email.eq_ignore_ascii_case(&user.email) {
                Some("email")
            } else if existing.username == user.username {
                Some("username")
            } else {
                None
            }
        });
        if let Some(field) = taken {
            return Err(StorageError::conflict(format!("{field} already in use")));
        }

        let created = User {
            id: self.user_ids.next(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role,
            is_active: user.is_active,
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.insert(created.id, created.clone());
        tracing::debug!(user_id = created.id, "user created");
        Ok(created)
    }

    async fn delete(&self, id: UserId) -> StorageResult<()> {
        let _guard = self.user_writes.lock().await;
        self.users
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("user", id))?;
        self.follows
            .retain(|(follower, followed), _| *follower != id && *followed != id);
        self.invitations.retain(|_, invitation| invitation.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl InvitationStorage for InMemoryStore {
    async fn create_invitation(&self, invitation: Invitation) -> StorageResult<()> {
        if !self.users.contains_key(&invitation.user_id) {
            return Err(StorageError::not_found("user", invitation.user_id));
        }
        self.invitations
            .retain(|_, pending| pending.user_id != invitation.user_id);
        self.invitations
            .insert(invitation.token_hash.clone(), invitation);
        Ok(())
    }

    async fn activate(&self, token_hash: &str, now: OffsetDateTime) -> StorageResult<User> {
        let (_, invitation) = self
            .invitations
            .remove(token_hash)
            .ok_or_else(|| StorageError::not_found("invitation", "token"))?;
        if invitation.is_expired_at(now) {
            tracing::debug!(user_id = invitation.user_id, "expired invitation redeemed");
            return Err(StorageError::not_found("invitation", "token"));
        }

        let mut user = self
            .users
            .get_mut(&invitation.user_id)
            .ok_or_else(|| StorageError::not_found("user", invitation.user_id))?;
        user.is_active = true;
        tracing::debug!(user_id = user.id, "user activated");
        Ok(user.clone())
    }
}

#[async_trait]
impl RoleStorage for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Role>> {
        Ok(self.roles.get(name).map(|r| r.clone()))
    }
}

#[async_trait]
impl PostStorage for InMemoryStore {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        if post.title.trim().is_empty() {
            return Err(StorageError::invalid("title is required"));
        }
        let now = OffsetDateTime::now_utc();
        let created = Post {
            id: self.post_ids.next(),
            owner_id: post.owner_id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: PostId) -> StorageResult<Option<Post>> {
        Ok(self.posts.get(&id).map(|p| p.clone()))
    }

    async fn update(
        &self,
        id: PostId,
        expected_version: i64,
        patch: PostPatch,
    ) -> StorageResult<Post> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("post", id))?;

        if post.version != expected_version {
            return Err(StorageError::conflict(format!(
                "post {id} is at version {}, expected {expected_version}",
                post.version
            )));
        }

        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        post.version += 1;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete(&self, id: PostId) -> StorageResult<()> {
        self.posts
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("post", id))?;
        self.comments.retain(|_, comment| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentStorage for InMemoryStore {
    async fn create(&self, comment: NewComment) -> StorageResult<Comment> {
        if comment.content.trim().is_empty() {
            return Err(StorageError::invalid("comment content is required"));
        }
        if !self.posts.contains_key(&comment.post_id) {
            return Err(StorageError::not_found("post", comment.post_id));
        }
        let created = Comment {
            id: self.comment_ids.next(),
            post_id: comment.post_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: OffsetDateTime::now_utc(),
        };
        self.comments.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl FollowerStorage for InMemoryStore {
    async fn follow(&self, follower: UserId, followed: UserId) -> StorageResult<()> {
        if !self.users.contains_key(&followed) {
            return Err(StorageError::not_found("user", followed));
        }
        match self.follows.entry((follower, followed)) {
            Entry::Occupied(_) => Err(StorageError::conflict(format!(
                "user {follower} already follows user {followed}"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(OffsetDateTime::now_utc());
                Ok(())
            }
        }
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> StorageResult<()> {
        self.follows.remove(&(follower, followed));
        Ok(())
    }
}
