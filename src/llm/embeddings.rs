use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::Error;

/// Maximum characters to send per text to the embedding API.
/// gemini-embedding-001 accepts 2 048 tokens; 6 000 chars stays under that
/// even for dense text.
const MAX_EMBED_CHARS: usize = 6_000;

/// What the embedding is used for. Gemini embeds documents and queries into
/// asymmetric spaces; the other providers ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

impl EmbedTask {
    fn gemini_task_type(self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embedding client for the configured provider.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl crate::llm::Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String], task: EmbedTask) -> crate::error::Result<Vec<Vec<f32>>> {
        let embeddings = embed_batch(&self.client, &self.config, texts, task)
            .await
            .map_err(Error::embedding)?;

        if embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }
}

/// Gemini addresses models as `models/<name>`.
pub(crate) fn gemini_model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Request and response shapes of each provider's embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedApi {
    /// `batchEmbedContents`
    Gemini,
    /// `/api/embed`
    Ollama,
    /// `/v1/embeddings`
    OpenAi,
}

impl EmbedApi {
    fn for_provider(provider: &str) -> Result<Self> {
        match provider {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Ollama => "Ollama",
            Self::OpenAi => "OpenAI",
        }
    }

    /// Inputs accepted per call.
    fn batch_limit(self) -> usize {
        match self {
            Self::Gemini => 100,
            Self::Ollama => 32,
            Self::OpenAi => 64,
        }
    }

    fn url(self, config: &LlmConfig) -> String {
        match self {
            Self::Gemini => format!(
                "{}/v1beta/{}:batchEmbedContents",
                config.base_url,
                gemini_model_path(&config.embedding_model)
            ),
            Self::Ollama => format!("{}/api/embed", config.base_url),
            Self::OpenAi => format!("{}/v1/embeddings", config.base_url),
        }
    }

    fn body(self, config: &LlmConfig, texts: &[String], task: EmbedTask) -> Value {
        match self {
            Self::Gemini => {
                let model = gemini_model_path(&config.embedding_model);
                let requests: Vec<Value> = texts
                    .iter()
                    .map(|text| {
                        json!({
                            "model": model,
                            "content": { "parts": [{ "text": text }] },
                            "taskType": task.gemini_task_type(),
                        })
                    })
                    .collect();
                json!({ "requests": requests })
            }
            // `truncate` asks Ollama to cut over-long inputs instead of failing.
            Self::Ollama => json!({
                "model": config.embedding_model,
                "input": texts,
                "truncate": true,
            }),
            Self::OpenAi => json!({
                "model": config.embedding_model,
                "input": texts,
            }),
        }
    }

    fn vectors(self, body: &Value) -> Result<Vec<Vec<f32>>> {
        let (list, field) = match self {
            Self::Gemini => ("embeddings", Some("values")),
            Self::Ollama => ("embeddings", None),
            Self::OpenAi => ("data", Some("embedding")),
        };
        let items = body[list]
            .as_array()
            .with_context(|| format!("{} embed response has no `{list}` array", self.label()))?;

        items
            .iter()
            .map(|item| {
                let vector = match field {
                    Some(field) => &item[field],
                    None => item,
                };
                serde_json::from_value(vector.clone())
                    .with_context(|| format!("Failed to parse {} embedding", self.label()))
            })
            .collect()
    }
}

/// Generate embeddings for a batch of texts using the configured LLM provider.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
    task: EmbedTask,
) -> Result<Vec<Vec<f32>>> {
    let api = EmbedApi::for_provider(&config.provider)?;
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    let url = api.url(config);
    let mut all_embeddings = Vec::with_capacity(truncated.len());

    for batch in truncated.chunks(api.batch_limit()) {
        let mut request = client.post(&url).json(&api.body(config, batch, task));
        request = match (api, config.api_key.as_deref()) {
            (EmbedApi::Gemini, Some(key)) => request.header("x-goog-api-key", key),
            (EmbedApi::Gemini, None) => {
                anyhow::bail!("GOOGLE_API_KEY is required for the gemini provider")
            }
            (EmbedApi::OpenAi, Some(key)) => request.bearer_auth(key),
            _ => request,
        };

        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to call {} embed API", api.label()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} embed API returned {status}: {body}", api.label());
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} embed response", api.label()))?;
        all_embeddings.extend(api.vectors(&body)?);
    }

    Ok(all_embeddings)
}
