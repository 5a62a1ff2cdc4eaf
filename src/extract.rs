use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` for request bodies, rejecting with `AppError` so a bad body
/// gets the same `{message}` shape as every other failure.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
