use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    auth::{
        is_valid_username, jwt, utils, AuthResponse, LoginUser, RegisterUser, UserResponse,
        RESERVED_USERNAMES,
    },
    config::settings::Settings,
    error::AppError,
    extract::JsonBody,
    store::DynStore,
};

/// POST /api/auth/register
pub async fn register(
    State(store): State<DynStore>,
    State(settings): State<Settings>,
    JsonBody(mut payload): JsonBody<RegisterUser>,
) -> Result<impl IntoResponse, AppError> {
    payload.username = payload.username.trim().to_string();
    payload.validate()?;

    if !is_valid_username(&payload.username) {
        return Err(AppError::BadRequest(
            "Username may only contain letters, numbers and underscores".to_string(),
        ));
    }
    if RESERVED_USERNAMES.contains(&payload.username.to_lowercase().as_str()) {
        return Err(AppError::BadRequest("Username is reserved".to_string()));
    }

    let password_hash = utils::hash_password(&payload.password).map_err(|e| {
        tracing::error!("Password hashing failed: {:?}", e);
        AppError::InternalServerError
    })?;

    let user = store.create_user(&payload.username, &password_hash).await?;
    tracing::info!(user_id = %user.id, "registered {}", user.username);

    let token = jwt::create_token(user.id, &settings.jwt_secret, settings.jwt_ttl_hours)
        .map_err(|_| AppError::InternalServerError)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(store): State<DynStore>,
    State(settings): State<Settings>,
    JsonBody(payload): JsonBody<LoginUser>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

    let user = store
        .find_user_by_username(payload.username.trim())
        .await?
        .ok_or_else(invalid)?;

    utils::verify_password(&user.password_hash, &payload.password).map_err(|_| invalid())?;

    let token = jwt::create_token(user.id, &settings.jwt_secret, settings.jwt_ttl_hours)
        .map_err(|_| AppError::InternalServerError)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// GET /api/auth/me
pub async fn get_me(
    State(store): State<DynStore>,
    claims: jwt::Claims,
) -> Result<impl IntoResponse, AppError> {
    let user = store
        .find_user(claims.sub)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserResponse::from(user)))
}
