use pulldown_cmark::{html, Event, Options, Parser};
use serde::Serialize;

use crate::models::{Message, Role};
use crate::surface::{ChatSurface, Phase};

/// Everything the page needs to draw a surface.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceView {
    pub session_id: String,
    pub user_id: Option<String>,
    pub awaiting_response: bool,
    pub messages: Vec<MessageView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub role: Role,
    pub content: String,
    /// Sanitized HTML for bot messages; user text is shown verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

pub(crate) fn render(surface: &ChatSurface) -> SurfaceView {
    SurfaceView {
        session_id: surface.session_id().to_string(),
        user_id: surface.user_id().map(str::to_string),
        awaiting_response: surface.phase() == Phase::AwaitingResponse,
        messages: surface.messages().iter().map(message_view).collect(),
        error: surface.last_error().map(str::to_string),
    }
}

fn message_view(message: &Message) -> MessageView {
    let html = match message.role {
        Role::Bot => Some(markdown_to_html(&message.content)),
        Role::User => None,
    };
    MessageView {
        role: message.role,
        content: message.content.clone(),
        html,
    }
}

/// Render markdown with every newline kept as a line break, then strip
/// anything unsafe.
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    ammonia::clean(&out)
}
