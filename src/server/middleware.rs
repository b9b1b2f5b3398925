use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use uuid::Uuid;

use super::AppState;
use crate::chat::User;
use crate::error::AppError;

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The user behind a valid bearer token.
///
/// Rejects with 401 when the token is missing or invalid, or its user no
/// longer exists.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Auth("Unauthorized".to_string());

        let token = extract_bearer_token(&parts.headers).ok_or_else(unauthorized)?;

        let claims = state.token_service.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            unauthorized()
        })?;

        let user_id = Uuid::parse_str(claims.user_id()).map_err(|_| unauthorized())?;

        let user = state.users.get(user_id).await?.ok_or_else(|| {
            tracing::debug!(user_id = %user_id, "Token for unknown user");
            unauthorized()
        })?;

        Ok(AuthUser(user))
    }
}
