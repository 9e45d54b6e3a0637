pub mod config;
pub mod datasource;
pub mod document;
pub mod embedding;
pub mod external;
pub mod extraction;
pub mod graph;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod vector;

pub use config::Config;
pub use datasource::{DataSource, LocalSource, UrlSource};
pub use document::{Document, Metadata, MetadataValue};
pub use embedding::{Embedder, EmbedderAdapter};
pub use external::{EmbeddingEngine, ExternalError, LLMEngine, VectorDB};
pub use extraction::{ExtractionModel, ExtractionResult, ExtractorAdapter, LlmExtractor};
pub use graph::{GraphError, GraphMerger, GraphStore, InMemoryGraphStore, MergeReport};
pub use parser::markdown_to_text;
pub use pipeline::{IngestionOrchestrator, IngestionSettings, IngestionSummary};
pub use query::{AnswerGenerator, QueryError, QueryService, RagContext};
pub use retry::RetryPolicy;
pub use vector::{InMemoryVectorIndex, VectorIndex, VectorIndexer};
