//! External embedding provider.
//!
//! The embedder is a black box behind an HTTP boundary: this module never
//! runs a model itself, it calls out to Cohere's `/v1/embed` endpoint and
//! maps transport/API failures onto `AppError::Upstream`. `InputType`
//! distinguishes documents being indexed from queries being searched,
//! since Cohere's embedding space is asymmetric between the two.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

const COHERE_EMBED_URL: &str = "https://api.cohere.ai/v1/embed";
const DEFAULT_MODEL: &str = "embed-english-v3.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Document,
    Query,
}

impl InputType {
    fn as_cohere_str(self) -> &'static str {
        match self {
            InputType::Document => "search_document",
            InputType::Query => "search_query",
        }
    }
}

/// External embedding collaborator. A trait so tests and offline
/// development can swap in a deterministic stand-in without a network
/// call or an API key.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], input_type: InputType) -> AppResult<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    truncate: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl CohereEmbedder {
    pub fn new(api_key: String, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;
        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed(&self, texts: &[String], input_type: InputType) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbedRequest {
            texts,
            model: &self.model,
            truncate: "END",
            input_type: input_type.as_cohere_str(),
        };

        let response = self
            .client
            .post(COHERE_EMBED_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "embedder request failed");
                AppError::Upstream(format!("embedder request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "embedder returned an error response");
            return Err(AppError::Upstream(format!(
                "embedder returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            AppError::Upstream(format!("embedder returned an unexpected response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(AppError::Upstream(format!(
                "embedder returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

/// Deterministic, network-free embedder used in tests and local
/// development when `COHERE_API_KEY` isn't set. Hashes each text into a
/// fixed-size vector so cosine/Euclidean search have something stable and
/// non-degenerate to operate on.
pub struct DeterministicEmbedder {
    pub dim: usize,
}

impl DeterministicEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            let slot = i % self.dim;
            vector[slot] += (byte as f32 + 1.0) * ((i as f32 % 7.0) + 1.0);
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, texts: &[String], _input_type: InputType) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_stable_and_nonzero() {
        let embedder = DeterministicEmbedder::new(8);
        let a = embedder
            .embed(&["hello world".to_string()], InputType::Document)
            .await
            .unwrap();
        let b = embedder
            .embed(&["hello world".to_string()], InputType::Document)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert!(a[0].iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn deterministic_embedder_distinguishes_different_texts() {
        let embedder = DeterministicEmbedder::new(8);
        let a = embedder
            .embed(&["alpha".to_string()], InputType::Document)
            .await
            .unwrap();
        let b = embedder
            .embed(&["beta".to_string()], InputType::Document)
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn empty_input_returns_empty_output() {
        let embedder = DeterministicEmbedder::new(8);
        let out = embedder.embed(&[], InputType::Query).await.unwrap();
        assert!(out.is_empty());
    }
}
