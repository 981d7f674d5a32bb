use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::Error;
use crate::llm::embeddings::gemini_model_path;
use crate::llm::{ChatModel, FragmentStream};

type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const GENERATION_TIMEOUT_SECS: u64 = 300;

/// Streaming generation client for the configured provider.
#[derive(Clone)]
pub struct HttpChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatModel {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn stream(&self, prompt: &str) -> crate::error::Result<FragmentStream> {
        let stream = stream_chat(&self.client, &self.config, prompt)
            .await
            .map_err(Error::generation)?;
        Ok(Box::pin(stream.map(|item| item.map_err(Error::generation))))
    }
}

/// Wire format of a provider's streaming generation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    /// `streamGenerateContent?alt=sse`, SSE `data:` lines
    Gemini,
    /// `/api/chat`, one JSON object per line
    Ollama,
    /// `/v1/chat/completions`, SSE `data:` lines ending in `[DONE]`
    OpenAi,
}

impl Dialect {
    fn for_provider(provider: &str) -> Result<Self> {
        match provider {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => anyhow::bail!("Unsupported LLM provider for chat: {other}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Ollama => "Ollama",
            Self::OpenAi => "OpenAI",
        }
    }

    fn request(
        self,
        client: &reqwest::Client,
        config: &LlmConfig,
        prompt: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let user_turn = json!([{ "role": "user", "content": prompt }]);

        let builder = match self {
            Self::Gemini => {
                let api_key = config
                    .api_key
                    .as_deref()
                    .context("GOOGLE_API_KEY is required for the gemini provider")?;
                let url = format!(
                    "{}/v1beta/{}:streamGenerateContent?alt=sse",
                    config.base_url,
                    gemini_model_path(&config.chat_model)
                );
                client
                    .post(url)
                    .header("x-goog-api-key", api_key)
                    .json(&json!({
                        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
                    }))
            }
            Self::Ollama => client
                .post(format!("{}/api/chat", config.base_url))
                .json(&json!({
                    "model": config.chat_model,
                    "messages": user_turn,
                    "stream": true,
                })),
            Self::OpenAi => {
                let request = client
                    .post(format!("{}/v1/chat/completions", config.base_url))
                    .json(&json!({
                        "model": config.chat_model,
                        "messages": user_turn,
                        "stream": true,
                    }));
                match config.api_key.as_deref() {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            }
        };
        Ok(builder.timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS)))
    }

    /// Interpret one line of the response body:
    /// `Some(Ok(text))` for a fragment, `Some(Err(_))` for a bad or refused
    /// chunk, `None` for lines carrying no text.
    fn parse_line(self, line: &str) -> Option<Result<String>> {
        let line = line.trim();
        let payload = match self {
            Self::Ollama => line,
            Self::Gemini | Self::OpenAi => line.strip_prefix("data:")?.trim(),
        };
        if payload.is_empty() || (self == Self::OpenAi && payload == "[DONE]") {
            return None;
        }

        let chunk: Value = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                return Some(Err(anyhow::anyhow!(
                    "Failed to parse {} chunk: {e}",
                    self.label()
                )))
            }
        };

        let text = match self {
            Self::Gemini => {
                if let Some(reason) = chunk.pointer("/promptFeedback/blockReason") {
                    let reason = reason.as_str().unwrap_or("unknown");
                    return Some(Err(anyhow::anyhow!("Gemini blocked the prompt: {reason}")));
                }
                gemini_text(&chunk)
            }
            Self::Ollama => {
                if chunk["done"].as_bool().unwrap_or(false) {
                    return None;
                }
                str_at(&chunk, "/message/content")
            }
            Self::OpenAi => str_at(&chunk, "/choices/0/delta/content"),
        };

        (!text.is_empty()).then_some(Ok(text))
    }
}

fn str_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Concatenated text parts of the first candidate.
fn gemini_text(chunk: &Value) -> String {
    chunk
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Stream a completion for a single user prompt.
/// Yields content fragments in arrival order.
pub async fn stream_chat(
    client: &reqwest::Client,
    config: &LlmConfig,
    prompt: &str,
) -> Result<ChatStream> {
    let dialect = Dialect::for_provider(&config.provider)?;

    let resp = dialect
        .request(client, config, prompt)?
        .send()
        .await
        .with_context(|| format!("Failed to connect to {} for chat streaming", dialect.label()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{} generate API returned {status}: {body}", dialect.label());
    }

    let stream = stream_lines(resp.bytes_stream()).filter_map(move |line| async move {
        match line {
            Ok(line) => dialect.parse_line(&line),
            Err(e) => Some(Err(e)),
        }
    });
    Ok(Box::pin(stream))
}

/// Accumulates raw body bytes and hands back whole lines. Bytes are decoded
/// only once a line is complete, so a character split across network chunks
/// stays intact.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// The next non-blank complete line, without its terminator.
    fn next_line(&mut self) -> Option<String> {
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let decoded = String::from_utf8_lossy(&raw[..end]);
            let line = decoded.strip_suffix('\r').unwrap_or(decoded.as_ref());
            if !line.trim().is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Whatever remains once the body has ended.
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned();
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Convert a byte stream into a stream of complete lines.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), LineBuffer::default(), false),
        |(mut body, mut buffer, ended)| async move {
            if ended {
                return None;
            }
            loop {
                if let Some(line) = buffer.next_line() {
                    return Some((Ok(line), (body, buffer, false)));
                }
                match body.next().await {
                    Some(Ok(bytes)) => buffer.push(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (body, buffer, true),
                        ))
                    }
                    None => {
                        return buffer
                            .finish()
                            .map(|rest| (Ok(rest), (body, buffer, true)))
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(Dialect::for_provider("bedrock").is_err());
        assert_eq!(Dialect::for_provider("openai").unwrap(), Dialect::OpenAi);
    }

    // ─── Gemini parsing ──────────────────────────────────

    #[test]
    fn test_parse_gemini_chunk() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Retrieval"}],"role":"model"}}]}"#;
        assert_eq!(Dialect::Gemini.parse_line(line).unwrap().unwrap(), "Retrieval");
    }

    #[test]
    fn test_parse_gemini_joins_parts() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(Dialect::Gemini.parse_line(line).unwrap().unwrap(), "ab");
    }

    #[test]
    fn test_parse_gemini_finish_chunk_without_text() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}],"usageMetadata":{}}"#;
        assert!(Dialect::Gemini.parse_line(line).is_none());
    }

    #[test]
    fn test_parse_gemini_blocked_prompt() {
        let line = r#"data: {"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = Dialect::Gemini.parse_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_gemini_malformed() {
        assert!(Dialect::Gemini.parse_line("data: {oops").unwrap().is_err());
        assert!(Dialect::Gemini.parse_line(": keep-alive").is_none());
    }

    // ─── Ollama parsing ──────────────────────────────────

    #[test]
    fn test_parse_ollama_chunk_and_done() {
        let line = r#"{"message":{"role":"assistant","content":"The main"},"done":false}"#;
        assert_eq!(Dialect::Ollama.parse_line(line).unwrap().unwrap(), "The main");

        let line = r#"{"message":{"role":"assistant","content":""},"done":true}"#;
        assert!(Dialect::Ollama.parse_line(line).is_none());
        assert!(Dialect::Ollama.parse_line("not valid json{{{").unwrap().is_err());
    }

    // ─── OpenAI parsing ──────────────────────────────────

    #[test]
    fn test_parse_openai_lines() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(Dialect::OpenAi.parse_line(line).unwrap().unwrap(), "Hello");

        assert!(Dialect::OpenAi.parse_line("data: [DONE]").is_none());
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(Dialect::OpenAi.parse_line(role_only).is_none());
    }

    #[test]
    fn test_parse_whitespace_line() {
        for dialect in [Dialect::Gemini, Dialect::Ollama, Dialect::OpenAi] {
            assert!(dialect.parse_line("   ").is_none());
        }
    }

    // ─── Line buffering ──────────────────────────────────

    #[tokio::test]
    async fn test_stream_lines_splits_across_chunks() {
        let parts: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"data: one\r\nda")),
            Ok(bytes::Bytes::from_static(b"ta: two\n\n")),
            Ok(bytes::Bytes::from_static(b"tail")),
        ];
        let lines: Vec<String> = stream_lines(futures_util::stream::iter(parts))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["data: one", "data: two", "tail"]);
    }

    #[test]
    fn test_line_buffer_keeps_split_multibyte_chars() {
        let text = "caf\u{e9}\n".as_bytes();
        let mut buffer = LineBuffer::default();
        // Split inside the two-byte encoding of the accented letter.
        buffer.push(&text[..4]);
        assert!(buffer.next_line().is_none());
        buffer.push(&text[4..]);
        assert_eq!(buffer.next_line().as_deref(), Some("caf\u{e9}"));
        assert!(buffer.finish().is_none());
    }
}
