use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::posts::{PostResponse, UserRef};

pub mod handler;

pub const SEARCH_LIMIT: usize = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfile {
    #[validate(length(max = 160, message = "Bio cannot exceed 160 characters"))]
    #[serde(default)]
    pub bio: String,
}

/// Profile view of an account, with the follow lists expanded to usernames.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUserResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub bio: String,
    pub posts_count: i64,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUserResponse,
    pub posts: Vec<PostResponse>,
}
