use async_trait::async_trait;
use ollama_rs::{generation::options::GenerationOptions, Ollama};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::embedding::Embedder;
use crate::external::error::ExternalError;
use crate::external::llm::ollama_client;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    /// Vector length produced by `model`
    pub dimension: usize,
}

impl EmbeddingConfig {
    /// Get the full URL for the Ollama service
    pub fn get_url(&self) -> Result<String, ExternalError> {
        let url = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        };

        // Validate the URL
        Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-minilm".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            dimension: 384,
        }
    }
}

/// Wrapper for Ollama embedding engine
pub struct EmbeddingEngine {
    client: Ollama,
    config: EmbeddingConfig,
}

impl EmbeddingEngine {
    /// Create a new embedding engine with the given configuration
    pub fn new(config: EmbeddingConfig) -> Result<Self, ExternalError> {
        let url = config.get_url()?;
        let client = ollama_client(&url, config.port)?;

        Ok(Self { client, config })
    }

    /// Generate embeddings for a text
    pub async fn generate_embeddings(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let response = self
            .client
            .generate_embeddings(
                self.config.model.clone(),
                text.to_string(),
                Some(GenerationOptions::default()),
            )
            .await
            .map_err(|e| ExternalError::RetryableEmbedding(e.to_string()))?;

        // Convert from Vec<f64> to Vec<f32>
        Ok(response.embeddings.into_iter().map(|x| x as f32).collect())
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        self.generate_embeddings(text).await
    }
}
