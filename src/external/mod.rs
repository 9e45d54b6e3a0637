mod embedding;
pub mod error;
mod llm;
pub mod vectordb;

pub use embedding::{EmbeddingConfig, EmbeddingEngine};
pub use error::ExternalError;
pub use llm::{LLMConfig, LLMEngine};
pub use vectordb::{VectorDB, VectorDBConfig};
