use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{PostRecord, PostScope, Store, StoreError, StoreResult, UserRecord};
use crate::social::Toggle;

const USER_SELECT: &str = r#"
    SELECT
        u.id, u.username, u.password_hash, u.bio, u.posts_count, u.created_at, u.updated_at,
        COALESCE(
            (SELECT ARRAY_AGG(f.follower_id ORDER BY f.created_at) FROM follows f WHERE f.following_id = u.id),
            '{}'::uuid[]
        ) AS followers,
        COALESCE(
            (SELECT ARRAY_AGG(f.following_id ORDER BY f.created_at) FROM follows f WHERE f.follower_id = u.id),
            '{}'::uuid[]
        ) AS following
    FROM users u
"#;

const POST_SELECT: &str = r#"
    SELECT
        p.id, p.author_id, p.content, p.likes_count, p.created_at, p.updated_at,
        COALESCE(
            (SELECT ARRAY_AGG(l.user_id ORDER BY l.created_at) FROM post_likes l WHERE l.post_id = p.id),
            '{}'::uuid[]
        ) AS likes
    FROM posts p
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies the bundled migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool))
    }

    async fn fetch_user<'e, E>(executor: E, id: Uuid) -> StoreResult<Option<UserRecord>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!("{USER_SELECT} WHERE u.id = $1");
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?)
    }

    async fn fetch_post<'e, E>(executor: E, id: Uuid) -> StoreResult<Option<PostRecord>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!("{POST_SELECT} WHERE p.id = $1");
        Ok(sqlx::query_as::<_, PostRecord>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?)
    }

    /// Holds the account for the rest of the transaction so it cannot vanish
    /// under a write that references it.
    async fn lock_user(tx: &mut Transaction<'static, Postgres>, id: Uuid) -> StoreResult<()> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR SHARE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .map(|_| ())
            .ok_or(StoreError::NotFound("User"))
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}

/// Escapes LIKE metacharacters so the query matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<UserRecord> {
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e: sqlx::Error| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    StoreError::Conflict("Username already taken".to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;

        Self::fetch_user(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound("User"))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        Self::fetch_user(&self.pool, id).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let query = format!("{USER_SELECT} WHERE u.username = $1");
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let sql = format!(
            "{USER_SELECT} WHERE u.username ILIKE $1 ESCAPE '\\' ORDER BY u.created_at LIMIT $2"
        );
        Ok(sqlx::query_as::<_, UserRecord>(&sql)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_bio(&self, id: Uuid, bio: &str) -> StoreResult<Option<UserRecord>> {
        let updated = sqlx::query("UPDATE users SET bio = $1, updated_at = NOW() WHERE id = $2")
            .bind(bio)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        Self::fetch_user(&self.pool, id).await
    }

    async fn toggle_follow(&self, follower: Uuid, target: Uuid) -> StoreResult<Toggle> {
        let mut tx = self.begin().await?;

        // Lock both accounts in a fixed order so opposing toggles cannot deadlock.
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![follower, target])
        .fetch_all(&mut *tx)
        .await?;

        if !locked.contains(&follower) || !locked.contains(&target) {
            return Err(StoreError::NotFound("User"));
        }

        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND following_id = $2")
            .bind(follower)
            .bind(target)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let toggle = Toggle::from_membership(removed > 0);
        if toggle == Toggle::Added {
            sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES ($1, $2)")
                .bind(follower)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE users SET updated_at = NOW() WHERE id = ANY($1)")
            .bind(vec![follower, target])
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(toggle)
    }

    async fn usernames(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT id, username FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn create_post(&self, author_id: Uuid, content: &str) -> StoreResult<PostRecord> {
        let mut tx = self.begin().await?;
        let id = Uuid::new_v4();

        // Bumping the counter first both locks the author row and proves it exists.
        let bumped = sqlx::query(
            "UPDATE users SET posts_count = posts_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(author_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if bumped == 0 {
            return Err(StoreError::NotFound("User"));
        }

        sqlx::query("INSERT INTO posts (id, author_id, content) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(author_id)
            .bind(content)
            .execute(&mut *tx)
            .await?;

        let post = Self::fetch_post(&mut *tx, id)
            .await?
            .ok_or(StoreError::NotFound("Post"))?;
        tx.commit().await?;
        Ok(post)
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<PostRecord>> {
        Self::fetch_post(&self.pool, id).await
    }

    async fn list_posts(
        &self,
        scope: PostScope<'_>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<PostRecord>> {
        let authors: Option<Vec<Uuid>> = match scope {
            PostScope::All => None,
            PostScope::AuthoredBy(ids) => Some(ids.to_vec()),
        };

        // A NULL limit returns every row.
        let query = format!(
            "{POST_SELECT} WHERE ($1::uuid[] IS NULL OR p.author_id = ANY($1)) \
             ORDER BY p.created_at DESC, p.id DESC LIMIT $2"
        );
        Ok(sqlx::query_as::<_, PostRecord>(&query)
            .bind(authors)
            .bind(limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_post_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> StoreResult<Option<PostRecord>> {
        let updated =
            sqlx::query("UPDATE posts SET content = $1, updated_at = NOW() WHERE id = $2")
                .bind(content)
                .bind(id)
                .execute(&self.pool)
                .await?
                .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        Self::fetch_post(&self.pool, id).await
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.begin().await?;

        let author_id = sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM posts WHERE id = $1 RETURNING author_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(author_id) = author_id else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE users SET posts_count = GREATEST(posts_count - 1, 0), updated_at = NOW() WHERE id = $1",
        )
        .bind(author_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<(Toggle, PostRecord)>> {
        let mut tx = self.begin().await?;

        Self::lock_user(&mut tx, user_id).await?;

        // Serializes toggles on the same post.
        let exists = sqlx::query("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let toggle = Toggle::from_membership(removed > 0);
        if toggle == Toggle::Added {
            sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        // The counter is recomputed from the like set, never adjusted blindly.
        sqlx::query(
            r#"
            UPDATE posts
            SET likes_count = (SELECT COUNT(*) FROM post_likes WHERE post_id = $1),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        let post = Self::fetch_post(&mut *tx, post_id)
            .await?
            .ok_or(StoreError::NotFound("Post"))?;
        tx.commit().await?;

        Ok(Some((toggle, post)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each `#[sqlx::test]` gets a fresh database from DATABASE_URL with the
    // migrations applied. Run with `cargo test -- --ignored`.

    async fn seeded(pool: PgPool) -> (PgStore, UserRecord, UserRecord) {
        let store = PgStore::new(pool);
        let alice = store.create_user("alice", "hash").await.unwrap();
        let bob = store.create_user("bob", "hash").await.unwrap();
        (store, alice, bob)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn duplicate_username_conflicts(pool: PgPool) {
        let (store, _, _) = seeded(pool).await;
        let err = store.create_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn follow_toggle_is_symmetric_and_round_trips(pool: PgPool) {
        let (store, alice, bob) = seeded(pool).await;

        assert_eq!(store.toggle_follow(alice.id, bob.id).await.unwrap(), Toggle::Added);
        let a = store.find_user(alice.id).await.unwrap().unwrap();
        let b = store.find_user(bob.id).await.unwrap().unwrap();
        assert_eq!(a.following, vec![bob.id]);
        assert_eq!(b.followers, vec![alice.id]);

        assert_eq!(store.toggle_follow(alice.id, bob.id).await.unwrap(), Toggle::Removed);
        let a = store.find_user(alice.id).await.unwrap().unwrap();
        let b = store.find_user(bob.id).await.unwrap().unwrap();
        assert!(a.following.is_empty());
        assert!(b.followers.is_empty());

        let err = store.toggle_follow(alice.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn like_count_tracks_like_set(pool: PgPool) {
        let (store, alice, bob) = seeded(pool).await;
        let post = store.create_post(alice.id, "hello").await.unwrap();

        for (expected, who) in [(1, bob.id), (2, alice.id), (1, bob.id), (0, alice.id)] {
            let (_, post) = store.toggle_like(post.id, who).await.unwrap().unwrap();
            assert_eq!(post.likes_count, expected);
            assert_eq!(post.likes_count, post.likes.len() as i64);
        }

        assert!(store.toggle_like(Uuid::new_v4(), bob.id).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn unknown_accounts_cannot_like_or_post(pool: PgPool) {
        let (store, alice, _) = seeded(pool).await;
        let post = store.create_post(alice.id, "hello").await.unwrap();
        let ghost = Uuid::new_v4();

        let err = store.toggle_like(post.id, ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));
        let err = store.create_post(ghost, "boo").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));

        let post = store.find_post(post.id).await.unwrap().unwrap();
        assert_eq!(post.likes_count, 0);
        assert_eq!(store.list_posts(PostScope::All, None).await.unwrap().len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn posts_count_follows_create_and_delete(pool: PgPool) {
        let (store, alice, _) = seeded(pool).await;
        let first = store.create_post(alice.id, "one").await.unwrap();
        store.create_post(alice.id, "two").await.unwrap();
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().posts_count, 2);

        assert!(store.delete_post(first.id).await.unwrap());
        assert!(!store.delete_post(first.id).await.unwrap());
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().posts_count, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_likes_keep_counter_consistent(pool: PgPool) {
        let (store, alice, _) = seeded(pool).await;
        let post_id = store.create_post(alice.id, "race").await.unwrap().id;

        let mut likers = Vec::new();
        for i in 0..16 {
            likers.push(store.create_user(&format!("liker_{i}"), "hash").await.unwrap().id);
        }

        let mut handles = Vec::new();
        for liker in likers {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_like(post_id, liker).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let post = store.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.likes_count, 16);
        assert_eq!(post.likes.len(), 16);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn search_matches_literally_and_ignores_case(pool: PgPool) {
        let (store, _, _) = seeded(pool).await;
        store.create_user("Alicia", "hash").await.unwrap();

        let found = store.search_users("ALI", 10).await.unwrap();
        let names: Vec<&str> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "Alicia"]);
        assert!(store.search_users("%", 10).await.unwrap().is_empty());
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("ali"), "%ali%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
