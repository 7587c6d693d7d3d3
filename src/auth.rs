use axum::http::HeaderMap;

use crate::response::AppError;

/// Header set by the surrounding app's auth layer after it has verified
/// the caller's session. Authentication itself lives outside this core.
const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

pub fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn require_user(headers: &HeaderMap) -> Result<AuthUser, AppError> {
    extract_user_id(headers)
        .map(|id| AuthUser { id })
        .ok_or_else(|| AppError::unauthorized("missing authenticated user identity"))
}
