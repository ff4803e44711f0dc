use crate::app::AppState;
use crate::handlers::{chat, chat_stream, health_check, login, me, root};
use axum::{Router, routing::get, routing::post};

/// Creates and configures all application routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
}
