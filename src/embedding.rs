use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::document::Document;
use crate::external::ExternalError;

/// The embedding collaborator: text in, fixed-length vector out
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError>;
}

/// Shared by ingestion and querying so both sides live in the same vector space
#[derive(Clone)]
pub struct EmbedderAdapter {
    embedder: Arc<dyn Embedder>,
}

impl EmbedderAdapter {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub async fn embed_document(&self, document: &Document) -> Result<Vec<f32>, ExternalError> {
        self.embed_text(&document.text).await
    }

    /// Embed arbitrary text, rejecting vectors of the wrong shape
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let vector = self.embedder.embed(text).await?;

        if vector.len() != self.dimension() {
            return Err(ExternalError::PermanentEmbedding(format!(
                "expected {} dimensions, got {}",
                self.dimension(),
                vector.len()
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(ExternalError::PermanentEmbedding(
                "vector contains non-finite values".to_string(),
            ));
        }

        Ok(vector)
    }
}
