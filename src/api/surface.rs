use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::{chat, internal, persist_all, ApiError};
use crate::models::{OpenSurfaceRequest, SubmitRequest};
use crate::state::{evict_idle, AppState, SurfaceEntry};
use crate::surface::{ChatSurface, Command, Input, Phase, SurfaceView};

const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Serialize)]
pub struct CreatedSurface {
    pub surface_id: Uuid,
    pub view: SurfaceView,
}

/// POST /api/surfaces: start a surface on a fresh session.
///
/// Idle surfaces past `surface_idle_secs` are evicted first.
pub async fn create_surface(
    State(state): State<AppState>,
    Json(req): Json<OpenSurfaceRequest>,
) -> (StatusCode, Json<CreatedSurface>) {
    let max_idle = Duration::from_secs(state.config.surface_idle_secs);
    let flushed = evict_idle(&state.surfaces, max_idle);
    if let Err(e) = persist_all(&state.store, &flushed).await {
        tracing::warn!("Failed to save an evicted surface: {e}");
    }

    let user_id = req.user_id.filter(|u| !u.trim().is_empty());
    let surface = ChatSurface::new(user_id);
    let view = surface.view();
    let surface_id = Uuid::new_v4();

    state
        .surfaces
        .lock()
        .insert(surface_id, SurfaceEntry::new(surface));
    tracing::info!("Surface {surface_id} opened on session {}", view.session_id);

    (StatusCode::CREATED, Json(CreatedSurface { surface_id, view }))
}

/// GET /api/surfaces/{id}
pub async fn get_surface(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceView>, ApiError> {
    let mut surfaces = state.surfaces.lock();
    let entry = surfaces.get_mut(&id).ok_or_else(|| not_found(id))?;
    entry.touch();
    Ok(Json(entry.surface.view()))
}

/// POST /api/surfaces/{id}/messages: append the user's message and start
/// generating the answer. The returned view already shows the message.
pub async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SurfaceView>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is required".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Message exceeds {MAX_MESSAGE_LEN} characters"),
        ));
    }

    let (commands, view) = {
        let mut surfaces = state.surfaces.lock();
        let entry = surfaces.get_mut(&id).ok_or_else(|| not_found(id))?;
        entry.touch();
        if entry.surface.phase() == Phase::AwaitingResponse {
            return Err(busy());
        }

        let commands = entry.surface.dispatch(Input::Submit(message.to_string()));
        for command in &commands {
            if let Command::Respond {
                question,
                session_id,
            } = command
            {
                let events = chat::start_turn(&state, id, question.clone(), session_id.clone());
                entry.events = Some(events);
            }
        }
        (commands, entry.surface.view())
    };

    persist_all(&state.store, &commands).await.map_err(internal)?;
    Ok(Json(view))
}

/// POST /api/surfaces/{id}/new
pub async fn new_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SurfaceView>, ApiError> {
    switch(&state, id, Input::NewConversation).await
}

/// POST /api/surfaces/{id}/open/{session_id}
pub async fn open_session(
    State(state): State<AppState>,
    Path((id, session_id)): Path<(Uuid, String)>,
) -> Result<Json<SurfaceView>, ApiError> {
    let messages = state.store.get(&session_id).await.map_err(internal)?;
    switch(&state, id, Input::OpenSession { session_id, messages }).await
}

/// Flush the current session, then move the surface to another one.
async fn switch(state: &AppState, id: Uuid, input: Input) -> Result<Json<SurfaceView>, ApiError> {
    let (commands, view) = {
        let mut surfaces = state.surfaces.lock();
        let entry = surfaces.get_mut(&id).ok_or_else(|| not_found(id))?;
        entry.touch();
        if entry.surface.phase() == Phase::AwaitingResponse {
            return Err(busy());
        }
        let commands = entry.surface.dispatch(input);
        (commands, entry.surface.view())
    };

    persist_all(&state.store, &commands).await.map_err(|e| {
        tracing::error!("Failed to save session before switching: {e}");
        internal(e)
    })?;
    Ok(Json(view))
}

fn not_found(id: Uuid) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Surface {id} not found"))
}

fn busy() -> ApiError {
    (
        StatusCode::CONFLICT,
        "A response is still being generated".to_string(),
    )
}
