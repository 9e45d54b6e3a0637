use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::external::ExternalError;
use crate::vector::{cosine_similarity, rank_matches, EmbeddingRecord, VectorIndex, VectorMatch};

/// Exhaustive cosine search over records held in memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<BTreeMap<String, EmbeddingRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), ExternalError> {
        self.records
            .write()
            .await
            .insert(record.document_id.clone(), record);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ExternalError> {
        let records = self.records.read().await;
        let mut matches: Vec<VectorMatch> = records
            .values()
            .map(|record| VectorMatch {
                document_id: record.document_id.clone(),
                score: cosine_similarity(vector, &record.vector),
                metadata: record.metadata.clone(),
                content: record.content.clone(),
            })
            .collect();

        rank_matches(&mut matches);
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize, ExternalError> {
        Ok(self.records.read().await.len())
    }

    async fn reset(&self) -> Result<(), ExternalError> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            document_id: id.to_string(),
            vector,
            metadata: Metadata::new(),
            content: format!("text of {}", id),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("d1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("d1", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.search(&[0.0, 1.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_orders_and_truncates() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("d1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("d2", vec![0.6, 0.8])).await.unwrap();
        index.upsert(record("d3", vec![0.0, 1.0])).await.unwrap();

        let hits = index.search(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert_eq!(hits[1].content, "text of d2");
    }

    #[tokio::test]
    async fn test_reset() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("d1", vec![1.0])).await.unwrap();
        index.reset().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[1.0], 5).await.unwrap().is_empty());
    }
}
