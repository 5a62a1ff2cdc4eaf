use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    store::{PostRecord, Store},
};

pub mod handler;

pub const FEED_LIMIT: usize = 50;

/// Body of both create and update requests.
#[derive(Debug, Deserialize)]
pub struct PostPayload {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Validate)]
struct PostContent {
    #[validate(length(max = 280, message = "Post cannot exceed 280 characters"))]
    content: String,
}

/// Trims and checks post content. Shared by create and update so an edit
/// cannot get around the creation limits.
pub fn normalize_content(raw: &str) -> Result<String, AppError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("Post content is required".to_string()));
    }
    let checked = PostContent {
        content: content.to_string(),
    };
    checked.validate()?;
    Ok(checked.content)
}

/// A user reference expanded for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub author: UserRef,
    pub likes: Vec<UserRef>,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn user_ref(names: &HashMap<Uuid, String>, id: Uuid) -> Option<UserRef> {
    names.get(&id).map(|username| UserRef {
        id,
        username: username.clone(),
    })
}

/// Expands ids in order. Ids with no account behind them are left out
/// rather than shown with a blank username.
pub fn user_refs(ids: &[Uuid], names: &HashMap<Uuid, String>) -> Vec<UserRef> {
    ids.iter().filter_map(|id| user_ref(names, *id)).collect()
}

/// Resolves authors and likers to usernames with one store lookup. A post
/// whose author cannot be resolved is skipped.
pub async fn expand_posts(
    store: &dyn Store,
    posts: Vec<PostRecord>,
) -> Result<Vec<PostResponse>, AppError> {
    let mut ids: Vec<Uuid> = posts
        .iter()
        .flat_map(|p| std::iter::once(p.author_id).chain(p.likes.iter().copied()))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let names = store.usernames(&ids).await?;

    Ok(posts
        .into_iter()
        .filter_map(|post| {
            let author = user_ref(&names, post.author_id)?;
            Some(PostResponse {
                id: post.id,
                content: post.content,
                author,
                likes: user_refs(&post.likes, &names),
                likes_count: post.likes_count,
                created_at: post.created_at,
                updated_at: post.updated_at,
            })
        })
        .collect())
}

pub async fn expand_post(store: &dyn Store, post: PostRecord) -> Result<PostResponse, AppError> {
    expand_posts(store, vec![post])
        .await?
        .pop()
        .ok_or(AppError::NotFound("User not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_bad_request(result: Result<String, AppError>) -> bool {
        matches!(result, Err(AppError::BadRequest(_)))
    }

    #[test]
    fn unresolved_references_are_dropped() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let names = HashMap::from([(known, "alice".to_string())]);

        let refs = user_refs(&[unknown, known, unknown], &names);
        assert_eq!(
            refs,
            vec![UserRef {
                id: known,
                username: "alice".to_string(),
            }]
        );
        assert!(user_refs(&[], &names).is_empty());
    }

    #[test]
    fn content_is_trimmed() {
        assert_eq!(normalize_content("  hello \n").unwrap(), "hello");
    }

    #[test]
    fn blank_content_is_rejected() {
        assert!(is_bad_request(normalize_content("")));
        assert!(is_bad_request(normalize_content(" \t\n ")));
    }

    #[test]
    fn length_boundary_is_280_characters() {
        assert!(normalize_content(&"a".repeat(280)).is_ok());
        assert!(is_bad_request(normalize_content(&"a".repeat(281))));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(normalize_content(&"é".repeat(280)).is_ok());
    }

    #[test]
    fn surrounding_whitespace_does_not_count() {
        let padded = format!("   {}   ", "a".repeat(280));
        assert_eq!(normalize_content(&padded).unwrap().len(), 280);
    }
}
