mod common;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use common::{corpus, scripted, Harness, KeywordEmbedder, D1, D2};
use knowledge_graph_builder::external::vectordb::point_id;
use knowledge_graph_builder::query::RAG_PROMPT_HEADER;
use knowledge_graph_builder::vector::{cosine_similarity, EmbeddingRecord, VectorMatch};
use knowledge_graph_builder::{
    Document, EmbedderAdapter, ExternalError, InMemoryGraphStore, QueryError, QueryService,
    VectorIndex, VectorIndexer,
};

/// Vector index that cuts at the limit with equal scores ordered by Qdrant
/// point id, the way the Qdrant server does
#[derive(Default)]
struct PointOrderedIndex {
    records: Mutex<Vec<EmbeddingRecord>>,
}

#[async_trait]
impl VectorIndex for PointOrderedIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), ExternalError> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.document_id != record.document_id);
        records.push(record);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorMatch>, ExternalError> {
        let records = self.records.lock().unwrap();
        let mut scored: Vec<(String, VectorMatch)> = records
            .iter()
            .map(|r| {
                let hit = VectorMatch {
                    document_id: r.document_id.clone(),
                    score: cosine_similarity(vector, &r.vector),
                    metadata: r.metadata.clone(),
                    content: r.content.clone(),
                };
                (point_id(&r.document_id), hit)
            })
            .collect();
        scored.sort_by(|(a_id, a), (b_id, b)| {
            b.score.partial_cmp(&a.score).unwrap().then_with(|| a_id.cmp(b_id))
        });
        Ok(scored.into_iter().take(limit).map(|(_, hit)| hit).collect())
    }

    async fn count(&self) -> Result<usize, ExternalError> {
        Ok(self.records.lock().unwrap().len())
    }

    async fn reset(&self) -> Result<(), ExternalError> {
        self.records.lock().unwrap().clear();
        Ok(())
    }
}

async fn ingested() -> Harness {
    let harness = Harness::new(Arc::new(scripted()));
    let summary = harness.orchestrator.ingest(corpus()).await;
    assert_eq!(summary.succeeded, 2);
    harness
}

#[tokio::test]
async fn test_rag_context_for_phoenix_project() {
    let harness = ingested().await;

    let rag = harness
        .query
        .rag_context("Who works on Phoenix Project?", 2)
        .await
        .unwrap();

    let ids: Vec<&str> = rag
        .context_documents
        .iter()
        .map(|d| d.document_id.as_str())
        .collect();
    // equal scores, so ids break the tie
    assert_eq!(ids, vec!["d1", "d2"]);
    assert_eq!(
        rag.prompt,
        format!(
            "{}\n{}\n\n{}\n\nQuestion: Who works on Phoenix Project?",
            RAG_PROMPT_HEADER, D1, D2
        )
    );
}

#[tokio::test]
async fn test_semantic_search_ranks_best_match_first() {
    let harness = ingested().await;

    let hits = harness
        .query
        .semantic_search("What does Bob support?", 2)
        .await
        .unwrap();

    assert_eq!(hits[0].document_id, "d2");
    assert!(hits[0].score > hits[1].score);
    assert_eq!(
        hits[0].metadata.get("source").and_then(|v| v.as_str()),
        Some("Email Archive")
    );
}

#[tokio::test]
async fn test_semantic_search_respects_top_k() {
    let harness = ingested().await;

    let hits = harness.query.semantic_search("phoenix", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_rag_on_empty_corpus_still_builds_prompt() {
    let harness = Harness::new(Arc::new(scripted()));

    let rag = harness.query.rag_context("Who leads?", 3).await.unwrap();

    assert!(rag.context_documents.is_empty());
    assert!(rag.prompt.starts_with(RAG_PROMPT_HEADER));
    assert!(rag.prompt.ends_with("Question: Who leads?"));
}

#[tokio::test]
async fn test_graph_search() {
    let harness = ingested().await;

    let found = harness.query.graph_search("PHOENIX project").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entity, "phoenix project");
    assert_eq!(
        found[0].mentioned_in_docs.iter().cloned().collect::<Vec<_>>(),
        vec!["d1", "d2"]
    );

    assert!(harness.query.graph_search("Globex").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_related_and_path() {
    let harness = ingested().await;

    let related = harness.query.related_entities("Alice", 1).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].label, "LEADS");

    let wider = harness.query.related_entities("Alice", 2).await.unwrap();
    assert_eq!(wider.len(), 2);

    let path = harness
        .query
        .find_path("alice", "Phoenix Project")
        .await
        .unwrap();
    assert_eq!(
        path,
        Some(vec!["alice".to_string(), "phoenix project".to_string()])
    );

    // edges are directed
    assert_eq!(
        harness.query.find_path("Phoenix Project", "Alice").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_malformed_queries_are_errors() {
    let harness = ingested().await;

    assert!(matches!(
        harness.query.semantic_search("", 3).await,
        Err(QueryError::EmptyQuery)
    ));
    assert!(matches!(
        harness.query.rag_context("Who?", 0).await,
        Err(QueryError::InvalidTopK)
    ));
    assert!(matches!(
        harness.query.find_path("alice", "   ").await,
        Err(QueryError::EmptyEntityName)
    ));
}

#[tokio::test]
async fn test_tied_scores_at_cutoff_resolve_by_document_id() {
    let index = Arc::new(PointOrderedIndex::default());
    let embedder = EmbedderAdapter::new(Arc::new(KeywordEmbedder));
    let indexer = VectorIndexer::new(index.clone());
    for id in ["d1", "d2", "d3"] {
        let document = Document::new(id, D1);
        let vector = embedder.embed_document(&document).await.unwrap();
        indexer.index(&document, vector).await.unwrap();
    }
    // the store alone would cut d2 in favour of d3
    let mut stored: Vec<&str> = vec!["d1", "d2", "d3"];
    stored.sort_by_key(|id| point_id(id));
    assert_ne!(&stored[..2], &["d1", "d2"]);

    let service = QueryService::new(embedder, index, Arc::new(InMemoryGraphStore::new()));
    let hits = service.semantic_search("Alice leads", 2).await.unwrap();

    let ids: Vec<&str> = hits.iter().map(|h| h.document_id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2"]);
}
