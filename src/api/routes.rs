use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

use crate::server::AppState;

use super::{auth, chat, health, metrics, users};

/// Version prefix for the chat REST surface
pub const API_PREFIX: &str = "/v0.1.0";

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Operational
        .route("/health", get(health::health))
        .route("/stats", get(health::stats))
        .route("/metrics", get(metrics::prometheus_metrics))
        .nest(
            API_PREFIX,
            Router::new()
                .route("/auth", post(auth::sign_in))
                .route("/users", post(users::register))
                .route("/users/me", get(users::me))
                .route("/chat/rooms", post(chat::create_room).get(chat::list_rooms))
                .route("/chat/rooms/{id}", get(chat::get_room))
                .route(
                    "/chat/rooms/{id}/messages",
                    get(chat::list_messages).post(chat::post_message),
                )
                .route("/chat/rooms/{id}/members", post(chat::add_member))
                .route("/chat/rooms/{id}/members/{user_id}", delete(chat::remove_member)),
        )
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": 404, "message": "Not Found" })),
    )
}
