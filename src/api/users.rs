use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use crate::chat::{Registration, User};
use crate::server::{AppState, AuthUser};

use super::response::{json_body, required, ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// POST /users
#[tracing::instrument(name = "api.register", skip_all)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<User> {
    let request = json_body(payload)?;

    let registration = Registration {
        first_name: required(request.first_name, "firstName")?,
        last_name: required(request.last_name, "lastName")?,
        email: required(request.email, "email")?,
        password: required(request.password, "password")?,
    };

    let user = state.users.register(registration).await?;
    Ok(ApiResponse::ok(user))
}

/// GET /users/me
pub async fn me(AuthUser(user): AuthUser) -> ApiResult<User> {
    Ok(ApiResponse::ok(user))
}
