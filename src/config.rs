use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::external::{EmbeddingConfig, LLMConfig, VectorDBConfig};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub max_concurrent_requests: usize,
    /// Attempts per external call, first try included
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Merge and index each side of a document even if the other side failed
    pub independent_stages: bool,
    pub log_level: String,
}

impl ProcessingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub graph_snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub llm: LLMConfig,
    pub vector_db: VectorDBConfig,
    pub processing: ProcessingConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` when
/// it is unset. A set but unparseable value is an error.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let ollama_host = env_string("OLLAMA_HOST", "localhost");
        let ollama_port = env_parse("OLLAMA_PORT", 11434u16)?;
        let dimension = env_parse("EMBEDDING_DIMENSION", 384usize)?;

        // Load embedding config
        let embedding = EmbeddingConfig {
            model: env_string("OLLAMA_EMBEDDING_MODEL", "all-minilm"),
            host: ollama_host.clone(),
            port: ollama_port,
            dimension,
        };

        // Load LLM config
        let llm = LLMConfig {
            model: env_string("OLLAMA_LLM_MODEL", "llama3:8b"),
            host: ollama_host,
            port: ollama_port,
            temperature: env_parse("OLLAMA_TEMPERATURE", 0.0f32)?,
            top_p: env_parse("OLLAMA_TOP_P", 0.9f32)?,
        };

        // Load vector DB config
        let vector_db = VectorDBConfig {
            collection_name: env_string("QDRANT_COLLECTION", "documents"),
            host: env_string("QDRANT_HOST", "localhost"),
            port: env_parse("QDRANT_PORT", 6334u16)?,
            vector_size: dimension,
        };

        // Load processing config
        let processing = ProcessingConfig {
            max_concurrent_requests: env_parse("MAX_CONCURRENT_REQUESTS", 4usize)?,
            max_retries: env_parse("MAX_RETRIES", 3u32)?,
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 500u64)?,
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", 10_000u64)?,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 120u64)?,
            independent_stages: env_parse("INDEPENDENT_STAGES", true)?,
            log_level: env_string("LOG_LEVEL", "info"),
        };

        let storage = StorageConfig {
            graph_snapshot_path: PathBuf::from(env_string(
                "GRAPH_SNAPSHOT_PATH",
                "./data/graph.json",
            )),
        };

        let query = QueryConfig {
            default_top_k: env_parse("DEFAULT_TOP_K", 5usize)?,
        };

        Ok(Self {
            embedding,
            llm,
            vector_db,
            processing,
            storage,
            query,
        })
    }
}
