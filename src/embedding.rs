//! HTTP client for OpenAI-compatible embedding services.
//!
//! Sends `POST {api_url}` with a bearer token and the body
//! `{"model": ..., "input": [...], "encoding_format": "float"}`, then reads
//! the vectors from `data[].embedding`. Each call is a single attempt;
//! callers wrap it in a [`RetryPolicy`](crate::retry::RetryPolicy).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use wikirag_core::embedding::{Embedder, EmbeddingError, EmbeddingErrorKind};

use crate::config::EmbeddingConfig;

/// Largest response body kept in a [`EmbeddingErrorKind::Status`] error.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct HttpEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build a client from `[embedding]`, resolving the API key.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(
            &config.api_url,
            api_key,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let first = texts.first().map(String::as_str).unwrap_or_default();
        let fail = |kind| EmbeddingError::new(first, kind);

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
            "encoding_format": "float",
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(EmbeddingErrorKind::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(fail(EmbeddingErrorKind::Status {
                status: status.as_u16(),
                body: body_text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            }));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| fail(EmbeddingErrorKind::Malformed(e.to_string())))?;

        let vectors =
            parse_response(&json).map_err(|msg| fail(EmbeddingErrorKind::Malformed(msg)))?;
        if vectors.len() != texts.len() {
            return Err(fail(EmbeddingErrorKind::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))));
        }
        Ok(vectors)
    }
}

/// Extract `data[].embedding` arrays in input order.
///
/// Items carrying an `index` field are placed by it; services are allowed to
/// return them out of order.
fn parse_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, String> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| "missing data array".to_string())?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| format!("item {} has no embedding array", pos))?;

        let vector = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| format!("item {} has a non-numeric component", pos))?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    for (expected, (index, _)) in indexed.iter().enumerate() {
        if *index != expected {
            return Err(format!(
                "item indices must be 0..{} without repeats, found {}",
                indexed.len(),
                index
            ));
        }
    }
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
