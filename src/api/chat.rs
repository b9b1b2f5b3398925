//! Chat room and message endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;

use crate::chat::{ChatMessageView, ChatRoomView};
use crate::error::AppError;
use crate::server::{AppState, AuthUser};

use super::response::{json_body, parse_id, required, ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Option<String>,
}

/// Raw paging parameters; values that are not integers fall back to defaults
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    fn parsed(value: Option<&str>) -> Option<i64> {
        value.and_then(|v| v.trim().parse().ok())
    }

    pub fn skip(&self) -> Option<i64> {
        Self::parsed(self.skip.as_deref())
    }

    pub fn limit(&self) -> Option<i64> {
        Self::parsed(self.limit.as_deref())
    }
}

/// POST /chat/rooms
pub async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> ApiResult<ChatRoomView> {
    let request = json_body(payload)?;
    let name = required(request.name, "name")?;

    let room = state.chat.create_room(&user, name.trim()).await?;
    Ok(ApiResponse::ok(room))
}

/// GET /chat/rooms
pub async fn list_rooms(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Vec<ChatRoomView>> {
    Ok(ApiResponse::ok(state.chat.list_rooms(&user).await?))
}

/// GET /chat/rooms/{id}
pub async fn get_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> ApiResult<ChatRoomView> {
    let room_id = parse_id(&room_id)?;
    Ok(ApiResponse::ok(state.chat.get_room(&user, room_id).await?))
}

/// GET /chat/rooms/{id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<ChatMessageView>> {
    let room_id = parse_id(&room_id)?;
    let Query(page) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    let messages = state
        .chat
        .list_messages(&user, room_id, page.skip(), page.limit())
        .await?;
    Ok(ApiResponse::ok(messages))
}

/// POST /chat/rooms/{id}/messages
#[tracing::instrument(name = "api.post_message", skip_all)]
pub async fn post_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> ApiResult<ChatMessageView> {
    let room_id = parse_id(&room_id)?;
    let request = json_body(payload)?;
    let message = required(request.message, "message")?;

    let view = state.chat.post_message(&user, room_id, &message).await?;
    Ok(ApiResponse::ok(view))
}

/// POST /chat/rooms/{id}/members
pub async fn add_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> ApiResult<ChatRoomView> {
    let room_id = parse_id(&room_id)?;
    let request = json_body(payload)?;
    let target = parse_id(&required(request.user_id, "userId")?)?;

    Ok(ApiResponse::ok(state.chat.add_member(&user, room_id, target).await?))
}

/// DELETE /chat/rooms/{id}/members/{user_id}
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((room_id, target)): Path<(String, String)>,
) -> ApiResult<ChatRoomView> {
    let room_id = parse_id(&room_id)?;
    let target = parse_id(&target)?;

    Ok(ApiResponse::ok(state.chat.remove_member(&user, room_id, target).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(skip: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            skip: skip.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn test_page_query_parses_integers() {
        let query = page(Some("5"), Some(" 20 "));
        assert_eq!(query.skip(), Some(5));
        assert_eq!(query.limit(), Some(20));
    }

    #[test]
    fn test_page_query_ignores_garbage() {
        let query = page(Some("abc"), Some(""));
        assert_eq!(query.skip(), None);
        assert_eq!(query.limit(), None);
        assert_eq!(page(None, None).limit(), None);
    }
}
