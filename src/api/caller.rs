//! Caller identity forwarded by the upstream gateway.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing caller identity"))?;

        Ok(Caller {
            user_id: user_id.to_string(),
        })
    }
}
