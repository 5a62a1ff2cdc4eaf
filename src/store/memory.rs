use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PostRecord, PostScope, Store, StoreError, StoreResult, UserRecord};
use crate::social::{self, Toggle};

#[derive(Default)]
struct Documents {
    // Registration order; search results follow it.
    users: Vec<UserRecord>,
    // Creation order; listings walk it backwards.
    posts: Vec<PostRecord>,
}

impl Documents {
    fn user_mut(&mut self, id: Uuid) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn post_mut(&mut self, id: Uuid) -> Option<&mut PostRecord> {
        self.posts.iter_mut().find(|p| p.id == id)
    }
}

/// Process-local store. Every mutation happens under one write guard, so
/// both sides of a follow edge and a like set with its counter change
/// together.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<Documents>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<UserRecord> {
        let mut docs = self.docs.write().await;
        if docs.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Conflict("Username already taken".to_string()));
        }

        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            bio: String::new(),
            posts_count: 0,
            followers: Vec::new(),
            following: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        docs.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let docs = self.docs.read().await;
        Ok(docs.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let docs = self.docs.read().await;
        Ok(docs.users.iter().find(|u| u.username == username).cloned())
    }

    async fn search_users(&self, query: &str, limit: usize) -> StoreResult<Vec<UserRecord>> {
        let needle = query.to_lowercase();
        let docs = self.docs.read().await;
        Ok(docs
            .users
            .iter()
            .filter(|u| u.username.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_bio(&self, id: Uuid, bio: &str) -> StoreResult<Option<UserRecord>> {
        let mut docs = self.docs.write().await;
        Ok(docs.user_mut(id).map(|user| {
            user.bio = bio.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn toggle_follow(&self, follower: Uuid, target: Uuid) -> StoreResult<Toggle> {
        let mut docs = self.docs.write().await;
        if !docs.users.iter().any(|u| u.id == target) {
            return Err(StoreError::NotFound("User"));
        }

        let source = docs.user_mut(follower).ok_or(StoreError::NotFound("User"))?;
        let toggle = social::toggle_member(&mut source.following, target);
        source.updated_at = Utc::now();

        let target = docs.user_mut(target).ok_or(StoreError::NotFound("User"))?;
        match toggle {
            Toggle::Added if !target.followers.contains(&follower) => {
                target.followers.push(follower)
            }
            Toggle::Added => {}
            Toggle::Removed => target.followers.retain(|id| *id != follower),
        }
        target.updated_at = Utc::now();

        Ok(toggle)
    }

    async fn usernames(&self, ids: &[Uuid]) -> StoreResult<HashMap<Uuid, String>> {
        let docs = self.docs.read().await;
        Ok(docs
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| (u.id, u.username.clone()))
            .collect())
    }

    async fn create_post(&self, author_id: Uuid, content: &str) -> StoreResult<PostRecord> {
        let mut docs = self.docs.write().await;
        let author = docs.user_mut(author_id).ok_or(StoreError::NotFound("User"))?;
        author.posts_count += 1;

        let now = Utc::now();
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id,
            content: content.to_string(),
            likes: Vec::new(),
            likes_count: 0,
            created_at: now,
            updated_at: now,
        };
        docs.posts.push(post.clone());
        Ok(post)
    }

    async fn find_post(&self, id: Uuid) -> StoreResult<Option<PostRecord>> {
        let docs = self.docs.read().await;
        Ok(docs.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_posts(
        &self,
        scope: PostScope<'_>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<PostRecord>> {
        let docs = self.docs.read().await;
        let in_scope = |post: &&PostRecord| match scope {
            PostScope::All => true,
            PostScope::AuthoredBy(authors) => authors.contains(&post.author_id),
        };
        Ok(docs
            .posts
            .iter()
            .rev()
            .filter(in_scope)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn update_post_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> StoreResult<Option<PostRecord>> {
        let mut docs = self.docs.write().await;
        Ok(docs.post_mut(id).map(|post| {
            post.content = content.to_string();
            post.updated_at = Utc::now();
            post.clone()
        }))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut docs = self.docs.write().await;
        let Some(index) = docs.posts.iter().position(|p| p.id == id) else {
            return Ok(false);
        };
        let post = docs.posts.remove(index);
        if let Some(author) = docs.user_mut(post.author_id) {
            author.posts_count = social::apply_delta(author.posts_count, Toggle::Removed);
        }
        Ok(true)
    }

    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<(Toggle, PostRecord)>> {
        let mut docs = self.docs.write().await;
        if !docs.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound("User"));
        }
        Ok(docs.post_mut(post_id).map(|post| {
            let toggle = social::toggle_member(&mut post.likes, user_id);
            post.likes_count = post.likes.len() as i64;
            post.updated_at = Utc::now();
            (toggle, post.clone())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, UserRecord, UserRecord) {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", "hash").await.unwrap();
        let bob = store.create_user("bob", "hash").await.unwrap();
        (store, alice, bob)
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let (store, _, _) = seeded().await;
        let err = store.create_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn follow_updates_both_sides_and_round_trips() {
        let (store, alice, bob) = seeded().await;

        let toggle = store.toggle_follow(alice.id, bob.id).await.unwrap();
        assert_eq!(toggle, Toggle::Added);

        let a = store.find_user(alice.id).await.unwrap().unwrap();
        let b = store.find_user(bob.id).await.unwrap().unwrap();
        assert_eq!(a.following, vec![bob.id]);
        assert_eq!(b.followers, vec![alice.id]);
        assert!(a.followers.is_empty());
        assert!(b.following.is_empty());

        let toggle = store.toggle_follow(alice.id, bob.id).await.unwrap();
        assert_eq!(toggle, Toggle::Removed);

        let a = store.find_user(alice.id).await.unwrap().unwrap();
        let b = store.find_user(bob.id).await.unwrap().unwrap();
        assert_eq!(a.following, alice.following);
        assert_eq!(b.followers, bob.followers);
    }

    #[tokio::test]
    async fn follow_unknown_target_is_not_found() {
        let (store, alice, _) = seeded().await;
        let err = store.toggle_follow(alice.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));
    }

    #[tokio::test]
    async fn like_count_tracks_like_set() {
        let (store, alice, bob) = seeded().await;
        let post = store.create_post(alice.id, "hello").await.unwrap();

        for (expected, who) in [(1, bob.id), (2, alice.id), (1, bob.id), (0, alice.id)] {
            let (_, post) = store.toggle_like(post.id, who).await.unwrap().unwrap();
            assert_eq!(post.likes_count, expected);
            assert_eq!(post.likes_count, post.likes.len() as i64);
        }
    }

    #[tokio::test]
    async fn unknown_accounts_cannot_like_or_post() {
        let (store, alice, _) = seeded().await;
        let post = store.create_post(alice.id, "hello").await.unwrap();
        let ghost = Uuid::new_v4();

        let err = store.toggle_like(post.id, ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));
        let err = store.create_post(ghost, "boo").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("User")));

        let post = store.find_post(post.id).await.unwrap().unwrap();
        assert!(post.likes.is_empty());
        assert_eq!(post.likes_count, 0);
        assert_eq!(store.list_posts(PostScope::All, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_likes_keep_counter_consistent() {
        let (store, alice, _) = seeded().await;
        let store = std::sync::Arc::new(store);
        let post_id = store.create_post(alice.id, "race").await.unwrap().id;

        let mut likers = Vec::new();
        for i in 0..32 {
            likers.push(store.create_user(&format!("liker_{i}"), "hash").await.unwrap().id);
        }
        let mut handles = Vec::new();
        for liker in likers.iter().copied() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.toggle_like(post_id, liker).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let post = store.find_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.likes_count, 32);
        assert_eq!(post.likes.len(), 32);
    }

    #[tokio::test]
    async fn posts_count_follows_create_and_delete() {
        let (store, alice, _) = seeded().await;
        let first = store.create_post(alice.id, "one").await.unwrap();
        store.create_post(alice.id, "two").await.unwrap();
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().posts_count, 2);

        assert!(store.delete_post(first.id).await.unwrap());
        assert!(!store.delete_post(first.id).await.unwrap());
        assert_eq!(store.find_user(alice.id).await.unwrap().unwrap().posts_count, 1);
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_scoped() {
        let (store, alice, bob) = seeded().await;
        let a1 = store.create_post(alice.id, "a1").await.unwrap();
        let b1 = store.create_post(bob.id, "b1").await.unwrap();
        let a2 = store.create_post(alice.id, "a2").await.unwrap();

        let all = store.list_posts(PostScope::All, Some(2)).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a2.id, b1.id]);

        let authors = [alice.id];
        let mine = store
            .list_posts(PostScope::AuthoredBy(&authors), None)
            .await
            .unwrap();
        let ids: Vec<Uuid> = mine.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a2.id, a1.id]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let (store, _, _) = seeded().await;
        store.create_user("Alicia", "hash").await.unwrap();

        let found = store.search_users("ALI", 10).await.unwrap();
        let names: Vec<&str> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "Alicia"]);

        assert_eq!(store.search_users("li", 1).await.unwrap().len(), 1);
        assert!(store.search_users("%", 10).await.unwrap().is_empty());
    }
}
