use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::jwt,
    error::AppError,
    extract::JsonBody,
    posts::{expand_post, expand_posts, normalize_content, PostPayload, FEED_LIMIT},
    response::MessageResponse,
    store::{DynStore, PostScope},
};

fn post_not_found() -> AppError {
    AppError::NotFound("Post not found".to_string())
}

/// Ids that do not parse can never match a post.
fn parse_post_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| post_not_found())
}

/// POST /api/posts
pub async fn create_post(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    JsonBody(payload): JsonBody<PostPayload>,
) -> Result<impl IntoResponse, AppError> {
    let content = normalize_content(&payload.content)?;

    let post = store.create_post(claims.sub, &content).await?;
    tracing::info!(user_id = %claims.sub, post_id = %post.id, "post created");

    Ok((StatusCode::CREATED, Json(expand_post(store.as_ref(), post).await?)))
}

/// GET /api/posts
pub async fn get_posts(State(store): State<DynStore>) -> Result<impl IntoResponse, AppError> {
    let posts = store.list_posts(PostScope::All, Some(FEED_LIMIT)).await?;
    Ok(Json(expand_posts(store.as_ref(), posts).await?))
}

/// GET /api/posts/feed
///
/// The caller's own posts plus everyone they follow.
pub async fn get_feed(
    State(store): State<DynStore>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .find_user(claims.sub)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let mut authors = user.following;
    authors.push(user.id);

    let posts = store
        .list_posts(PostScope::AuthoredBy(&authors), Some(FEED_LIMIT))
        .await?;
    Ok(Json(expand_posts(store.as_ref(), posts).await?))
}

/// PUT /api/posts/:id
pub async fn update_post(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<PostPayload>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_post_id(&id)?;

    let post = store.find_post(id).await?.ok_or_else(post_not_found)?;
    if post.author_id != claims.sub {
        return Err(AppError::Forbidden("Not authorized".to_string()));
    }

    let content = normalize_content(&payload.content)?;
    let post = store
        .update_post_content(id, &content)
        .await?
        .ok_or_else(post_not_found)?;

    Ok(Json(expand_post(store.as_ref(), post).await?))
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_post_id(&id)?;

    let post = store.find_post(id).await?.ok_or_else(post_not_found)?;
    if post.author_id != claims.sub {
        return Err(AppError::Forbidden("Not authorized".to_string()));
    }

    if !store.delete_post(id).await? {
        return Err(post_not_found());
    }
    tracing::info!(user_id = %claims.sub, post_id = %id, "post deleted");

    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

/// POST /api/posts/:id/like
///
/// Likes the post, or unlikes it if the caller already did.
pub async fn toggle_like(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_post_id(&id)?;

    let (toggle, post) = store
        .toggle_like(id, claims.sub)
        .await?
        .ok_or_else(post_not_found)?;
    tracing::debug!(
        user_id = %claims.sub,
        post_id = %id,
        liked = toggle.is_member(),
        likes_count = post.likes_count,
        "like toggled"
    );

    Ok(Json(expand_post(store.as_ref(), post).await?))
}
