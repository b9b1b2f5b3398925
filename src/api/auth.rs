use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::server::AppState;

use super::response::{json_body, ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// POST /auth - exchange credentials for an access token
#[tracing::instrument(name = "api.sign_in", skip_all)]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let request = json_body(payload)?;

    let (Some(email), Some(password)) = (request.email, request.password) else {
        return Err(AppError::Validation("Missing credentials".to_string()));
    };

    let token = state.users.sign_in(&email, &password).await?;
    Ok(ApiResponse::ok(TokenResponse { token }))
}
