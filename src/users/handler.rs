use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{jwt, UserResponse},
    error::AppError,
    extract::JsonBody,
    posts::{expand_posts, user_refs},
    response::FollowResponse,
    store::{DynStore, PostScope},
    users::{ProfileResponse, ProfileUserResponse, UpdateProfile, SEARCH_LIMIT},
};

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

/// GET /api/users/:username
///
/// Public profile plus every post by the user, newest first.
pub async fn get_profile(
    State(store): State<DynStore>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(user_not_found)?;

    let related: Vec<Uuid> = user
        .followers
        .iter()
        .chain(user.following.iter())
        .copied()
        .collect();
    let names = store.usernames(&related).await?;

    let authors = [user.id];
    let posts = store
        .list_posts(PostScope::AuthoredBy(&authors), None)
        .await?;
    let posts = expand_posts(store.as_ref(), posts).await?;

    Ok(Json(ProfileResponse {
        user: ProfileUserResponse {
            id: user.id,
            followers: user_refs(&user.followers, &names),
            following: user_refs(&user.following, &names),
            username: user.username,
            bio: user.bio,
            posts_count: user.posts_count,
            created_at: user.created_at,
            updated_at: user.updated_at,
        },
        posts,
    }))
}

/// POST /api/users/:username/follow
///
/// Follows the user, or unfollows if the caller already follows them.
pub async fn toggle_follow(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let target = store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(user_not_found)?;

    if target.id == claims.sub {
        return Err(AppError::BadRequest("Cannot follow yourself".to_string()));
    }

    let toggle = store.toggle_follow(claims.sub, target.id).await?;
    tracing::info!(
        user_id = %claims.sub,
        target_id = %target.id,
        following = toggle.is_member(),
        "follow toggled"
    );

    Ok(Json(FollowResponse::new(toggle.is_member())))
}

/// GET /api/users/search/:query
pub async fn search_users(
    State(store): State<DynStore>,
    Path(query): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let users = store.search_users(&query, SEARCH_LIMIT).await?;
    let response: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(response))
}

/// PUT /api/users/profile
pub async fn update_profile(
    State(store): State<DynStore>,
    claims: jwt::Claims,
    JsonBody(mut payload): JsonBody<UpdateProfile>,
) -> Result<impl IntoResponse, AppError> {
    payload.bio = payload.bio.trim().to_string();
    payload.validate()?;

    let user = store
        .update_bio(claims.sub, &payload.bio)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(UserResponse::from(user)))
}
