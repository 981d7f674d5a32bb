use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::api::{persist_all, ApiError};
use crate::state::AppState;
use crate::surface::Input;

const IDLE_TIMEOUT_SECS: u64 = 30;

/// GET /api/surfaces/{id}/response: stream the running turn as SSE.
///
/// Events: `delta {content}` per fragment, then `done {}` or `error {message}`.
/// Events emitted before the client connected are replayed first.
pub async fn stream_response(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = {
        let mut surfaces = state.surfaces.lock();
        let entry = surfaces
            .get_mut(&id)
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Surface {id} not found")))?;
        entry.touch();
        entry.events.take().ok_or_else(|| {
            (
                StatusCode::CONFLICT,
                "No response is pending".to_string(),
            )
        })?
    };

    let events = UnboundedReceiverStream::new(events).map(Ok::<_, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Spawn generation for a submitted question. The turn completes and is
/// saved whether or not anyone reads the returned events.
pub(crate) fn start_turn(
    state: &AppState,
    surface_id: Uuid,
    question: String,
    session_id: String,
) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_turn(state.clone(), surface_id, question, session_id, tx));
    rx
}

/// Generate, feed the outcome back into the surface, then persist.
async fn run_turn(
    state: AppState,
    surface_id: Uuid,
    question: String,
    session_id: String,
    tx: mpsc::UnboundedSender<Event>,
) {
    let outcome = match state.chat_semaphore.clone().acquire_owned().await {
        Ok(permit) => {
            let outcome = generate(&state, &question, &session_id, &tx).await;
            drop(permit);
            outcome
        }
        Err(_) => Err("Chat service is shutting down".to_string()),
    };

    let (input, failure) = match outcome {
        Ok(answer) => (Input::ResponseComplete(answer), None),
        Err(message) => {
            tracing::warn!("Response for session {session_id} failed: {message}");
            (Input::ResponseFailed(message.clone()), Some(message))
        }
    };

    let commands = match state.surfaces.lock().get_mut(&surface_id) {
        Some(entry) => {
            entry.touch();
            entry.surface.dispatch(input)
        }
        None => {
            tracing::warn!("Surface {surface_id} closed before its response finished");
            Vec::new()
        }
    };

    let saved = persist_all(&state.store, &commands).await;
    if let Err(e) = &saved {
        tracing::error!("Failed to save session {session_id}: {e}");
    }

    let last = match (failure, saved) {
        (Some(message), _) => error_event(&message),
        (None, Err(e)) => error_event(&format!("Failed to save conversation: {e}")),
        (None, Ok(())) => Event::default().event("done").data("{}"),
    };
    // A closed receiver means nobody is listening; the turn is saved regardless.
    let _ = tx.send(last);
}

/// Relay fragments to the client and return the full answer.
async fn generate(
    state: &AppState,
    question: &str,
    session_id: &str,
    tx: &mpsc::UnboundedSender<Event>,
) -> Result<String, String> {
    let mut fragments = state
        .responder
        .respond(question, session_id)
        .await
        .map_err(|e| e.to_string())?;

    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);
    let mut answer = String::new();

    loop {
        match tokio::time::timeout(idle_timeout, fragments.next()).await {
            Ok(Some(Ok(fragment))) => {
                answer.push_str(&fragment);
                let _ = tx.send(delta_event(&fragment));
            }
            Ok(Some(Err(e))) => return Err(e.to_string()),
            Ok(None) => return Ok(answer),
            Err(_) => return Err("LLM response timed out (idle)".to_string()),
        }
    }
}

fn delta_event(content: &str) -> Event {
    Event::default()
        .event("delta")
        .data(serde_json::json!({ "content": content }).to_string())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(serde_json::json!({ "message": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_payload_escapes_newlines() {
        // Each payload has to stay on a single `data:` line.
        let payload = serde_json::json!({ "content": "a\nb\r" }).to_string();
        assert!(!payload.contains('\n'));
        assert!(!payload.contains('\r'));
        let _ = delta_event("a\nb\r");
    }
}
