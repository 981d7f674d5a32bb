use axum::extract::{Path, State};
use axum::Json;

use crate::api::{internal, ApiError};
use crate::models::{SessionResponse, SessionSummary};
use crate::state::AppState;

/// GET /api/sessions/{session_id}: empty message list for an unknown id.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let messages = state.store.get(&session_id).await.map_err(internal)?;
    Ok(Json(SessionResponse {
        session_id,
        messages,
    }))
}

/// GET /api/users/{user_id}/sessions: newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let records = state.store.list_by_user(&user_id).await.map_err(internal)?;
    Ok(Json(records.into_iter().map(SessionSummary::from).collect()))
}
