//! Embedding provider abstraction.
//!
//! The pipeline treats the embedding model as an external collaborator:
//! anything that turns a batch of texts into fixed-length vectors. The
//! bundled [`OllamaProvider`] calls a local Ollama server over HTTP with
//! retry and exponential backoff for transient failures.
//!
//! Also hosts the BLOB codec used to persist vectors: each `f32` is four
//! little-endian bytes, so a stored embedding is `dims × 4` bytes.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Turns text into fixed-length vectors. Dimensionality is a property of
/// the model and assumed constant for the life of a store.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Build the provider named by the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, EmbedError> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => Err(EmbedError::Request(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Embedding provider backed by a local Ollama server.
///
/// Calls `POST /api/embeddings` once per text. Retry strategy:
/// - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, …)
/// - other 4xx → fail immediately
/// - network errors → retry
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embeddings", self.endpoint);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
                        return parse_embedding(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(EmbedError::Request(format!(
                            "ollama error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(EmbedError::Request(format!(
                        "ollama error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Request(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Request("embedding failed after retries".to_string())))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }
}

fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let values = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::InvalidResponse("missing embedding array".to_string()))?;

    if values.is_empty() {
        return Err(EmbedError::InvalidResponse("empty embedding".to_string()));
    }

    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn empty_blob_is_empty_vec() {
        assert!(blob_to_vec(&[]).is_empty());
        assert!(vec_to_blob(&[]).is_empty());
    }

    #[test]
    fn parse_embedding_happy_path() {
        let json = serde_json::json!({ "embedding": [0.25, -1.0, 2.0] });
        assert_eq!(parse_embedding(&json).unwrap(), vec![0.25, -1.0, 2.0]);
    }

    #[test]
    fn parse_embedding_rejects_missing_field() {
        let json = serde_json::json!({ "vector": [1.0] });
        assert!(matches!(
            parse_embedding(&json),
            Err(EmbedError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parse_embedding_rejects_empty() {
        let json = serde_json::json!({ "embedding": [] });
        assert!(matches!(
            parse_embedding(&json),
            Err(EmbedError::InvalidResponse(_))
        ));
    }

    #[test]
    fn create_provider_rejects_unknown() {
        let mut config = EmbeddingConfig::default();
        config.provider = "cohere".to_string();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn create_provider_ollama() {
        let config = EmbeddingConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }
}
