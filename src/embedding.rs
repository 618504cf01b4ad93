//! OpenAI embeddings client with batching and retry.
//!
//! Requests go to `POST /v1/embeddings` with the configured model. The
//! response rows are re-sorted by their `index` field so output order
//! always matches input order, and the row count is checked against the
//! input count.
//!
//! # Retry Strategy
//!
//! - HTTP 429, HTTP 5xx, and transport errors retry with exponential
//!   backoff (base delay, then 2x, 4x, ...)
//! - any other non-success status fails immediately
//! - exhausting the retry budget surfaces the last transient error
//!
//! Vector utilities for BLOB storage live here too: [`vec_to_blob`] and
//! [`blob_to_vec`] encode embeddings as little-endian f32 bytes.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::error::IngestError;

pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Clock seam so retry backoff is observable in tests.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a single attempt failed: transient failures are retried, fatal
/// ones abort the whole batch.
enum AttemptError {
    Transient(String),
    Fatal(IngestError),
}

async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, IngestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let attempts = max_attempts.max(1);
    let mut last = String::new();
    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = base_delay * 2u32.pow(attempt - 1);
            sleeper.sleep(delay).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Transient(reason)) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    %reason,
                    "Transient embedding failure"
                );
                last = reason;
            }
        }
    }
    Err(IngestError::Embedding {
        attempts,
        reason: last,
    })
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    base_delay: Duration,
    sleeper: Box<dyn Sleeper>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// Build a client from configuration. Requires the `OPENAI_API_KEY`
    /// environment variable; the endpoint can be overridden in config
    /// for proxies and tests.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<EmbeddingClient> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            IngestError::MissingDependency(
                "OPENAI_API_KEY environment variable not set".to_string(),
            )
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EmbeddingClient {
            http,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_EMBEDDINGS_URL.to_string()),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            sleeper: Box::new(TokioSleeper),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed one batch of texts, in order. One API call per invocation;
    /// the caller handles batching.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IngestError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        retry_with_backoff(
            self.max_retries,
            self.base_delay,
            self.sleeper.as_ref(),
            || self.send_batch(texts),
        )
        .await
    }

    async fn send_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AttemptError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AttemptError::Transient(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Transient(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(IngestError::EmbeddingRejected {
                status: status.as_u16(),
                reason: snippet(&body),
            }));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| AttemptError::Transient(format!("invalid response body: {}", err)))?;

        if payload.data.len() != texts.len() {
            return Err(AttemptError::Fatal(IngestError::EmbeddingRejected {
                status: status.as_u16(),
                reason: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    payload.data.len()
                ),
            }));
        }

        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

fn snippet(body: &str) -> String {
    const LIMIT: usize = 200;
    let mut out: String = body.chars().take(LIMIT).collect();
    if body.chars().count() > LIMIT {
        out.push_str("...");
    }
    out
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use chunk_silo::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
