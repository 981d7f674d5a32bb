//! Per-browser chat state machine.
//!
//! ```text
//!            Submit(text)                     ResponseComplete / ResponseFailed
//!   Idle ─────────────────> AwaitingResponse ─────────────────────────────────> Idle
//!    │   emits Respond                          emits Persist
//!    │
//!    └── NewConversation / OpenSession: emits Persist for non-empty state, then resets
//! ```
//!
//! The surface never performs I/O. [`ChatSurface::dispatch`] returns the
//! [`Command`]s the caller must execute, in order.

pub mod view;

use uuid::Uuid;

use crate::models::Message;

pub use view::{MessageView, SurfaceView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Submit(String),
    ResponseComplete(String),
    ResponseFailed(String),
    NewConversation,
    OpenSession {
        session_id: String,
        messages: Vec<Message>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Persist {
        session_id: String,
        messages: Vec<Message>,
        user_id: Option<String>,
    },
    Respond {
        question: String,
        session_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct ChatSurface {
    session_id: String,
    user_id: Option<String>,
    messages: Vec<Message>,
    pending_input: Option<String>,
    last_error: Option<String>,
}

impl ChatSurface {
    /// A fresh surface on a new session.
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            session_id: new_session_id(),
            user_id,
            messages: Vec::new(),
            pending_input: None,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.pending_input.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn phase(&self) -> Phase {
        if self.pending_input.is_some() {
            Phase::AwaitingResponse
        } else {
            Phase::Idle
        }
    }

    /// Apply `input` and return the side effects it requires.
    ///
    /// Inputs that do not apply to the current phase leave the state
    /// untouched and return no commands.
    pub fn dispatch(&mut self, input: Input) -> Vec<Command> {
        match (self.phase(), input) {
            (Phase::Idle, Input::Submit(text)) => {
                let question = text.trim();
                if question.is_empty() {
                    return Vec::new();
                }
                let question = question.to_string();
                self.last_error = None;
                self.messages.push(Message::user(question.clone()));
                self.pending_input = Some(question.clone());
                vec![Command::Respond {
                    question,
                    session_id: self.session_id.clone(),
                }]
            }
            (Phase::AwaitingResponse, Input::ResponseComplete(answer)) => {
                self.pending_input = None;
                self.messages.push(Message::bot(answer));
                vec![self.persist()]
            }
            (Phase::AwaitingResponse, Input::ResponseFailed(error)) => {
                self.pending_input = None;
                self.last_error = Some(error);
                vec![self.persist()]
            }
            (Phase::Idle, Input::NewConversation) => {
                let commands = self.flush();
                self.reset(new_session_id(), Vec::new());
                commands
            }
            (Phase::Idle, Input::OpenSession { session_id, messages }) => {
                let commands = self.flush();
                self.reset(session_id, messages);
                commands
            }
            (phase, input) => {
                tracing::debug!("Ignoring {input:?} in phase {phase:?}");
                Vec::new()
            }
        }
    }

    pub fn view(&self) -> SurfaceView {
        view::render(self)
    }

    fn persist(&self) -> Command {
        Command::Persist {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            user_id: self.user_id.clone(),
        }
    }

    /// The save needed to keep the current session, if it has any messages.
    pub fn flush(&self) -> Vec<Command> {
        if self.messages.is_empty() {
            Vec::new()
        } else {
            vec![self.persist()]
        }
    }

    fn reset(&mut self, session_id: String, messages: Vec<Message>) {
        self.session_id = session_id;
        self.messages = messages;
        self.pending_input = None;
        self.last_error = None;
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}
