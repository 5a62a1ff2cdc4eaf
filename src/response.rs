use serde::Serialize;

/// Body for endpoints that only confirm an action, e.g. `{"message": "..."}`.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a follow toggle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowResponse {
    pub message: String,
    pub is_following: bool,
}

impl FollowResponse {
    pub fn new(is_following: bool) -> Self {
        let message = if is_following {
            "Followed successfully"
        } else {
            "Unfollowed successfully"
        };
        Self {
            message: message.to_string(),
            is_following,
        }
    }
}
