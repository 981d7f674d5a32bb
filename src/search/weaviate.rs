use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::VectorStoreConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata, ScoredChunk};
use crate::search::{check_parallel, VectorIndex};

/// Objects per `/v1/batch/objects` call.
const BATCH_SIZE: usize = 100;

/// Vector index backed by a Weaviate collection. Vectors are supplied by the
/// caller (`vectorizer: none`), so Weaviate only stores and searches them.
pub struct WeaviateIndex {
    client: reqwest::Client,
    config: VectorStoreConfig,
}

impl WeaviateIndex {
    pub fn new(client: reqwest::Client, config: VectorStoreConfig) -> Result<Self> {
        if !is_valid_class_name(&config.index_name) {
            return Err(Error::Index(format!(
                "invalid Weaviate class name: {:?}",
                config.index_name
            )));
        }
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn create_class_if_missing(&self) -> AnyResult<()> {
        let class = &self.config.index_name;
        let resp = self
            .request(reqwest::Method::GET, &format!("/v1/schema/{class}"))
            .send()
            .await
            .context("Failed to reach Weaviate schema API")?;

        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Weaviate schema lookup returned {status}: {body}");
        }

        tracing::info!("Creating Weaviate class {class}");
        let resp = self
            .request(reqwest::Method::POST, "/v1/schema")
            .json(&class_definition(class, &self.config.text_key))
            .send()
            .await
            .context("Failed to create Weaviate class")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Weaviate class creation returned {status}: {body}");
        }
        Ok(())
    }

    async fn upsert_batches(&self, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> AnyResult<usize> {
        let mut stored = 0;
        let mut embeddings = embeddings.into_iter();

        for batch in chunks.chunks(BATCH_SIZE) {
            let objects: Vec<Value> = batch
                .iter()
                .zip(embeddings.by_ref())
                .map(|(chunk, vector)| {
                    json!({
                        "class": self.config.index_name,
                        "properties": object_properties(chunk, &self.config.text_key),
                        "vector": vector,
                    })
                })
                .collect();

            let resp = self
                .request(reqwest::Method::POST, "/v1/batch/objects")
                .json(&json!({ "objects": objects }))
                .send()
                .await
                .context("Failed to call Weaviate batch API")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Weaviate batch API returned {status}: {body}");
            }

            let results: Vec<BatchObjectResult> = resp
                .json()
                .await
                .context("Failed to parse Weaviate batch response")?;
            if let Some(message) = first_batch_error(&results) {
                anyhow::bail!("Weaviate rejected an object: {message}");
            }

            stored += batch.len();
            tracing::debug!("Upserted {stored}/{} chunks into Weaviate", chunks.len());
        }

        Ok(stored)
    }

    async fn near_vector(&self, query_embedding: &[f32], k: usize) -> AnyResult<Vec<ScoredChunk>> {
        let query = near_vector_query(
            &self.config.index_name,
            &self.config.text_key,
            query_embedding,
            k,
        );

        let resp = self
            .request(reqwest::Method::POST, "/v1/graphql")
            .json(&json!({ "query": query }))
            .send()
            .await
            .context("Failed to call Weaviate GraphQL API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Weaviate GraphQL API returned {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse Weaviate GraphQL response")?;
        parse_near_vector(&body, &self.config.index_name, &self.config.text_key)
    }
}

#[async_trait]
impl VectorIndex for WeaviateIndex {
    async fn ensure_index(&self) -> Result<()> {
        self.create_class_if_missing().await.map_err(Error::index)
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: Vec<Vec<f32>>) -> Result<usize> {
        check_parallel(chunks, &embeddings)?;
        self.upsert_batches(chunks, embeddings)
            .await
            .map_err(Error::index)
    }

    async fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.near_vector(query_embedding, k)
            .await
            .map_err(Error::index)
    }
}

/// GraphQL class names start with an uppercase letter.
fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn class_definition(class: &str, text_key: &str) -> Value {
    json!({
        "class": class,
        "vectorizer": "none",
        "properties": [
            { "name": text_key, "dataType": ["text"] }
        ]
    })
}

/// Chunk metadata plus the text under `text_key`. Keys are already sanitized
/// into valid property names.
fn object_properties(chunk: &Chunk, text_key: &str) -> Metadata {
    let mut properties = chunk.metadata.clone();
    properties.insert(text_key.to_string(), Value::String(chunk.text.clone()));
    properties
}

fn near_vector_query(class: &str, text_key: &str, vector: &[f32], k: usize) -> String {
    let vector = vector
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "{{ Get {{ {class}(nearVector: {{vector: [{vector}]}}, limit: {k}) \
         {{ {text_key} _additional {{ distance }} }} }} }}"
    )
}

fn parse_near_vector(body: &Value, class: &str, text_key: &str) -> AnyResult<Vec<ScoredChunk>> {
    if let Some(message) = body
        .get("errors")
        .and_then(|e| e.as_array())
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        anyhow::bail!("Weaviate query failed: {message}");
    }

    let hits = body
        .pointer(&format!("/data/Get/{class}"))
        .and_then(|v| v.as_array())
        .context("Weaviate response has no results for the class")?;

    Ok(hits
        .iter()
        .map(|hit| {
            let text = hit
                .get(text_key)
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            let distance = hit
                .pointer("/_additional/distance")
                .and_then(|d| d.as_f64())
                .unwrap_or(1.0) as f32;
            ScoredChunk {
                text,
                metadata: Metadata::new(),
                score: 1.0 - distance,
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    result: Option<BatchResult>,
}

#[derive(Deserialize)]
struct BatchResult {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<BatchErrorMessage>,
}

#[derive(Deserialize)]
struct BatchErrorMessage {
    message: String,
}

fn first_batch_error(results: &[BatchObjectResult]) -> Option<&str> {
    results
        .iter()
        .filter_map(|r| r.result.as_ref()?.errors.as_ref())
        .flat_map(|e| e.error.iter())
        .map(|e| e.message.as_str())
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_validation() {
        assert!(is_valid_class_name("Documents"));
        assert!(is_valid_class_name("Docs_2"));
        assert!(!is_valid_class_name("documents"));
        assert!(!is_valid_class_name("Docs-2"));
        assert!(!is_valid_class_name(""));
    }

    #[test]
    fn test_new_rejects_invalid_class() {
        let config = VectorStoreConfig {
            index_name: "bad name".into(),
            ..VectorStoreConfig::default()
        };
        assert!(matches!(
            WeaviateIndex::new(reqwest::Client::new(), config),
            Err(Error::Index(_))
        ));
    }

    #[test]
    fn test_near_vector_query_shape() {
        let query = near_vector_query("Documents", "text", &[0.5, -1.0], 5);
        assert!(query.contains("Documents(nearVector: {vector: [0.5,-1]}, limit: 5)"));
        assert!(query.contains("{ text _additional { distance } }"));
    }

    #[test]
    fn test_parse_near_vector_hits() {
        let body = json!({
            "data": { "Get": { "Documents": [
                { "text": "first", "_additional": { "distance": 0.25 } },
                { "text": "second", "_additional": { "distance": 0.5 } }
            ]}}
        });
        let hits = parse_near_vector(&body, "Documents", "text").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first");
        assert!((hits[0].score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_parse_near_vector_graphql_error() {
        let body = json!({ "errors": [{ "message": "Cannot query field" }] });
        let err = parse_near_vector(&body, "Documents", "text").unwrap_err();
        assert!(err.to_string().contains("Cannot query field"));
    }

    #[test]
    fn test_object_properties_include_text_and_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), json!("a.pdf"));
        let chunk = Chunk {
            text: "body".into(),
            metadata,
        };
        let props = object_properties(&chunk, "text");
        assert_eq!(props["text"], "body");
        assert_eq!(props["source"], "a.pdf");
    }

    #[test]
    fn test_batch_errors_detected() {
        let results: Vec<BatchObjectResult> = serde_json::from_value(json!([
            { "result": {} },
            { "result": { "errors": { "error": [{ "message": "bad vector" }] } } }
        ]))
        .unwrap();
        assert_eq!(first_batch_error(&results), Some("bad vector"));

        let ok: Vec<BatchObjectResult> =
            serde_json::from_value(json!([{ "id": "x", "result": {} }])).unwrap();
        assert_eq!(first_batch_error(&ok), None);
    }

    #[test]
    fn test_class_definition_disables_vectorizer() {
        let def = class_definition("Documents", "text");
        assert_eq!(def["vectorizer"], "none");
        assert_eq!(def["properties"][0]["name"], "text");
    }
}
