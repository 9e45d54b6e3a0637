use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::external::error::ExternalError;
use crate::query::AnswerGenerator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub host: String,
    pub port: u16,
    pub temperature: f32,
    pub top_p: f32,
}

impl LLMConfig {
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

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "llama3:8b".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            // extraction wants repeatable output
            temperature: 0.0,
            top_p: 0.9,
        }
    }
}

/// Build an Ollama client for a validated `scheme://host:port` URL
pub(crate) fn ollama_client(url: &str, port: u16) -> Result<Ollama, ExternalError> {
    let url = Url::parse(url)
        .map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| ExternalError::ConfigError(format!("URL has no host: {}", url)))?;

    Ok(Ollama::new(format!("{}://{}", url.scheme(), host), port))
}

/// Wrapper for Ollama LLM engine
pub struct LLMEngine {
    client: Ollama,
    config: LLMConfig,
}

impl LLMEngine {
    /// Create a new LLM engine with the given configuration
    pub fn new(config: LLMConfig) -> Result<Self, ExternalError> {
        let url = config.get_url()?;
        let client = ollama_client(&url, config.port)?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate text completion
    pub async fn generate(&self, prompt: &str) -> Result<String, ExternalError> {
        let mut request = GenerationRequest::new(self.config.model.clone(), prompt.to_string());

        let options = GenerationOptions::default()
            .temperature(self.config.temperature)
            .top_p(self.config.top_p);

        request.options = Some(options);

        debug!(model = %self.config.model, prompt_len = prompt.len(), "sending generation request");
        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| ExternalError::OllamaError(e.to_string()))?;

        Ok(response.response)
    }
}

#[async_trait]
impl AnswerGenerator for LLMEngine {
    async fn generate(&self, prompt: &str) -> Result<String, ExternalError> {
        LLMEngine::generate(self, prompt).await
    }
}
