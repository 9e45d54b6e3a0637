mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::document::{Document, Metadata};
use crate::external::ExternalError;

pub use memory::InMemoryVectorIndex;

/// One stored embedding, keyed by document id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document_id: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    /// Document text, kept so RAG can assemble context without a second store
    pub content: String,
}

/// A nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub document_id: String,
    pub score: f32,
    pub metadata: Metadata,
    #[serde(skip_serializing, default)]
    pub content: String,
}

/// Storage for document embeddings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the record for `record.document_id`
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), ExternalError>;

    /// Up to `limit` best matches. Equal scores may come back in any order.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, ExternalError>;

    async fn count(&self) -> Result<usize, ExternalError>;

    async fn reset(&self) -> Result<(), ExternalError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Order by descending score, ties broken by ascending document id
pub fn rank_matches(matches: &mut [VectorMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

/// Writes document embeddings into a vector index
#[derive(Clone)]
pub struct VectorIndexer {
    index: Arc<dyn VectorIndex>,
}

impl VectorIndexer {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Idempotent upsert keyed by the document id
    pub async fn index(&self, document: &Document, vector: Vec<f32>) -> Result<(), ExternalError> {
        debug!(document_id = %document.id, dimension = vector.len(), "indexing embedding");
        self.index
            .upsert(EmbeddingRecord {
                document_id: document.id.clone(),
                vector,
                metadata: document.source_metadata.clone(),
                content: document.text.clone(),
            })
            .await
    }
}
