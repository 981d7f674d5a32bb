//! Axum handlers and the route table.

pub mod chat;
pub mod sessions;
pub mod surface;

use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::surface::Command;
use crate::store::SessionStore;

/// Error half of every handler result.
pub type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    // No CORS layer: the page is served from the same origin.
    Router::new()
        .route("/", get(serve_index))
        .route("/api/surfaces", post(surface::create_surface))
        .route("/api/surfaces/{id}", get(surface::get_surface))
        .route("/api/surfaces/{id}/messages", post(surface::submit_message))
        .route("/api/surfaces/{id}/response", get(chat::stream_response))
        .route("/api/surfaces/{id}/new", post(surface::new_conversation))
        .route(
            "/api/surfaces/{id}/open/{session_id}",
            post(surface::open_session),
        )
        .route("/api/sessions/{session_id}", get(sessions::get_session))
        .route("/api/users/{user_id}/sessions", get(sessions::list_sessions))
        .with_state(state)
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// Execute the `Persist` commands in `commands`, stopping at the first
/// failed save. `Respond` commands are started by the submit handler.
pub(crate) async fn persist_all(store: &SessionStore, commands: &[Command]) -> crate::error::Result<()> {
    for command in commands {
        if let Command::Persist {
            session_id,
            messages,
            user_id,
        } = command
        {
            store
                .save(session_id, messages, user_id.as_deref())
                .await?;
        }
    }
    Ok(())
}

pub(crate) fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
