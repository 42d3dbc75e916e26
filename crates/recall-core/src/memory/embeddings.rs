//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates text embeddings using an OpenAI-compatible `/embeddings` API and
//! provides the cosine similarity used by the ranker.
//! ============================================================================

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Expected embedding dimension for text-embedding-3-small
pub const EMBEDDING_DIM: usize = 1536;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

impl EmbeddingService {
    /// Create a new embedding service using the OpenAI API
    pub fn new_openai(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            OPENAI_BASE_URL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and model (self-hosted or proxy endpoints)
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions: None,
        }
    }

    /// Ask the API to shorten vectors to `dimensions` (text-embedding-3 models)
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Generate embeddings for multiple texts
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!(
                    "Embedding API error ({}): {}",
                    status,
                    error.error.message
                ));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        parse_embedding_response(&body)
    }

    /// Generate embedding for a single text
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn parse_embedding_response(body: &str) -> Result<Vec<Vec<f32>>> {
    let embedding_response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse embedding response: {} - body: {}", e, body))?;

    if let Some(usage) = &embedding_response.usage {
        debug!(
            "Embedding tokens used: {} (model: {})",
            usage.total_tokens, embedding_response.model
        );
    }

    // API may return entries out of order
    let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
        .data
        .into_iter()
        .map(|d| (d.index, d.embedding))
        .collect();
    embeddings.sort_by_key(|(idx, _)| *idx);

    Ok(embeddings.into_iter().map(|(_, e)| e).collect())
}

/// Create an embedding service, preferring a dedicated endpoint over OpenAI
pub fn create_embedding_service(
    api_key: Option<String>,
    base_url: Option<String>,
    openai_api_key: Option<String>,
) -> Result<EmbeddingService> {
    if let (Some(key), Some(url)) = (api_key, base_url) {
        if !key.is_empty() && !url.is_empty() {
            debug!("Using {} for embeddings", url);
            return Ok(EmbeddingService::new_custom(
                key,
                url,
                DEFAULT_EMBEDDING_MODEL.to_string(),
            ));
        }
    }

    if let Some(key) = openai_api_key {
        if !key.is_empty() {
            warn!("No dedicated embedding endpoint configured, falling back to OpenAI");
            return Ok(EmbeddingService::new_openai(key));
        }
    }

    Err(anyhow!(
        "No embedding API key available (tried RECALL_EMBEDDING_API_KEY and OPENAI_API_KEY)"
    ))
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value between -1.0 and 1.0. Mismatched lengths and zero vectors
/// yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // accumulate in f64; 1536 f32 products drift noticeably
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let service = EmbeddingService::new_openai("test-key".to_string());
        assert_eq!(service.base_url(), "https://api.openai.com/v1");
        assert_eq!(service.model(), DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_custom_base_url_trimmed() {
        let service = EmbeddingService::new_custom(
            "k".to_string(),
            "http://localhost:8080/v1/".to_string(),
            "nomic-embed-text".to_string(),
        );
        assert_eq!(service.base_url(), "http://localhost:8080/v1");
        assert_eq!(service.model(), "nomic-embed-text");
    }

    #[test]
    fn test_service_selection() {
        let service = create_embedding_service(
            Some("local".into()),
            Some("http://localhost:8080/v1".into()),
            Some("sk-openai".into()),
        )
        .unwrap();
        assert_eq!(service.base_url(), "http://localhost:8080/v1");

        let service = create_embedding_service(None, None, Some("sk-openai".into())).unwrap();
        assert_eq!(service.base_url(), "https://api.openai.com/v1");

        assert!(create_embedding_service(Some(String::new()), None, None).is_err());
    }

    #[test]
    fn test_response_sorted_by_index() {
        let body = r#"{
            "model": "text-embedding-3-small",
            "data": [
                {"embedding": [0.0, 1.0], "index": 1},
                {"embedding": [1.0, 0.0], "index": 0}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }"#;
        let embeddings = parse_embedding_response(body).unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_request_omits_unset_dimensions() {
        let request = EmbeddingRequest {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            input: vec!["hi".to_string()],
            dimensions: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("dimensions"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let service = EmbeddingService::new_openai("test-key".to_string());
        let result = service.embed(vec![]).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
