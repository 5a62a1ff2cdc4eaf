use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::social::Toggle;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type DynStore = Arc<dyn Store>;

/// Account document. `followers` and `following` are the two sides of the
/// follow edge set, in the order the edges were created.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub bio: String,
    pub posts_count: i64,
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub likes: Vec<Uuid>,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which posts a listing covers.
#[derive(Debug, Clone, Copy)]
pub enum PostScope<'a> {
    All,
    AuthoredBy(&'a [Uuid]),
}

/// Entity store behind the HTTP layer.
///
/// Multi-field mutations (`toggle_follow`, `toggle_like`, `create_post`,
/// `delete_post`) are atomic: callers never observe one side of a follow
/// edge without the other, or a like set out of step with its count.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<UserRecord>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    /// Case-insensitive literal substring match on username.
    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>>;

    async fn update_bio(&self, id: Uuid, bio: &str) -> StoreResult<Option<UserRecord>>;

    /// Flips the follow edge `follower -> target` on both sides at once.
    async fn toggle_follow(&self, follower: Uuid, target: Uuid) -> StoreResult<Toggle>;

    /// Maps ids to usernames. Unknown ids are left out.
    async fn usernames(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>>;

    /// Persists the post and bumps the author's `posts_count`.
    async fn create_post(&self, author_id: Uuid, content: &str) -> StoreResult<PostRecord>;

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<PostRecord>>;

    /// Newest first. `limit` of `None` returns everything in scope.
    async fn list_posts(
        &self,
        scope: PostScope<'_>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<PostRecord>>;

    async fn update_post_content(&self, id: Uuid, content: &str)
        -> StoreResult<Option<PostRecord>>;

    /// Removes the post and decrements the author's `posts_count`.
    /// Returns false when the post did not exist.
    async fn delete_post(&self, id: Uuid) -> StoreResult<bool>;

    /// Flips `user_id` in the post's like set. `None` when the post is gone.
    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<(Toggle, PostRecord)>>;
}
