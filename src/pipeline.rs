use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::config::ProcessingConfig;
use crate::document::Document;
use crate::embedding::EmbedderAdapter;
use crate::extraction::{ExtractionResult, ExtractorAdapter};
use crate::graph::{GraphMerger, MergeReport};
use crate::retry::{RetryError, RetryPolicy};
use crate::vector::VectorIndexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Embedding,
    Merge,
    Index,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Embedding => "embedding",
            Stage::Merge => "merge",
            Stage::Index => "index",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Permanent,
    RetryableExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    fn permanent(stage: Stage, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            kind: FailureKind::Permanent,
            reason: reason.to_string(),
        }
    }

    fn from_retry(stage: Stage, err: RetryError) -> Self {
        let kind = match err {
            RetryError::Permanent(_) => FailureKind::Permanent,
            RetryError::Exhausted { .. } => FailureKind::RetryableExhausted,
        };
        Self {
            stage,
            kind,
            reason: err.to_string(),
        }
    }
}

/// What happened to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub merge: Option<MergeReport>,
    pub indexed: bool,
    pub failures: Vec<StageFailure>,
}

impl DocumentOutcome {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Permanent wins over retryable: a document that would fail again
    /// regardless is not worth re-running.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.failures.is_empty() {
            None
        } else if self
            .failures
            .iter()
            .any(|f| f.kind == FailureKind::Permanent)
        {
            Some(FailureKind::Permanent)
        } else {
            Some(FailureKind::RetryableExhausted)
        }
    }
}

/// A failed document as reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub document_id: String,
    pub kind: FailureKind,
    pub failures: Vec<StageFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_permanent: usize,
    pub failed_retryable_exhausted: usize,
    pub failed: Vec<FailedDocument>,
    /// Per-document detail in input order
    pub outcomes: Vec<DocumentOutcome>,
}

impl IngestionSummary {
    pub fn from_outcomes(outcomes: Vec<DocumentOutcome>) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in &outcomes {
            match outcome.failure_kind() {
                None => summary.succeeded += 1,
                Some(kind) => {
                    match kind {
                        FailureKind::Permanent => summary.failed_permanent += 1,
                        FailureKind::RetryableExhausted => {
                            summary.failed_retryable_exhausted += 1
                        }
                    }
                    summary.failed.push(FailedDocument {
                        document_id: outcome.document_id.clone(),
                        kind,
                        failures: outcome.failures.clone(),
                    });
                }
            }
        }

        summary.outcomes = outcomes;
        summary
    }

    /// The run failed as a whole only when there was work and none of it
    /// succeeded
    pub fn is_total_failure(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.document_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionSettings {
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub independent_stages: bool,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            retry: RetryPolicy::default(),
            independent_stages: true,
        }
    }
}

impl From<&ProcessingConfig> for IngestionSettings {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrent_requests.max(1),
            retry: config.retry_policy(),
            independent_stages: config.independent_stages,
        }
    }
}

/// Drives documents through extraction, embedding, merge and indexing
pub struct IngestionOrchestrator {
    extractor: ExtractorAdapter,
    embedder: EmbedderAdapter,
    merger: GraphMerger,
    indexer: VectorIndexer,
    settings: IngestionSettings,
}

impl IngestionOrchestrator {
    pub fn new(
        extractor: ExtractorAdapter,
        embedder: EmbedderAdapter,
        merger: GraphMerger,
        indexer: VectorIndexer,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            extractor,
            embedder,
            merger,
            indexer,
            settings,
        }
    }

    /// Ingest a batch. Individual failures are recorded, never propagated.
    pub async fn ingest(&self, documents: Vec<Document>) -> IngestionSummary {
        info!(
            documents = documents.len(),
            concurrency = self.settings.max_concurrency,
            "starting ingestion"
        );

        let outcomes: Vec<DocumentOutcome> = stream::iter(documents)
            .map(|document| async move { self.ingest_document(&document).await })
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let summary = IngestionSummary::from_outcomes(outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed_permanent = summary.failed_permanent,
            failed_retryable_exhausted = summary.failed_retryable_exhausted,
            "ingestion finished"
        );
        summary
    }

    /// A blank document has nothing to extract or embed. It is merged as an
    /// empty extraction, never reaches the models and is not indexed.
    async fn ingest_blank(&self, document: &Document) -> DocumentOutcome {
        debug!(document_id = %document.id, "blank document, skipping model calls");
        let mut outcome = DocumentOutcome {
            document_id: document.id.clone(),
            merge: None,
            indexed: false,
            failures: Vec::new(),
        };
        match self
            .merger
            .merge(&document.id, &ExtractionResult::default())
            .await
        {
            Ok(report) => outcome.merge = Some(report),
            Err(e) => outcome.failures.push(StageFailure::permanent(Stage::Merge, e)),
        }
        outcome
    }

    /// Run one document through every stage
    pub async fn ingest_document(&self, document: &Document) -> DocumentOutcome {
        if document.is_blank() {
            return self.ingest_blank(document).await;
        }
        let retry = self.settings.retry;

        let (extraction, embedding) = tokio::join!(
            retry.run("extraction", || self.extractor.extract(document)),
            retry.run("embedding", || self.embedder.embed_document(document)),
        );

        let mut outcome = DocumentOutcome {
            document_id: document.id.clone(),
            merge: None,
            indexed: false,
            failures: Vec::new(),
        };

        let extraction = match extraction {
            Ok(result) => Some(result),
            Err(e) => {
                outcome
                    .failures
                    .push(StageFailure::from_retry(Stage::Extraction, e));
                None
            }
        };
        let embedding = match embedding {
            Ok(vector) => Some(vector),
            Err(e) => {
                outcome
                    .failures
                    .push(StageFailure::from_retry(Stage::Embedding, e));
                None
            }
        };

        let may_write = self.settings.independent_stages || outcome.failures.is_empty();

        if let Some(extraction) = extraction.filter(|_| may_write) {
            match self.merger.merge(&document.id, &extraction).await {
                Ok(report) => outcome.merge = Some(report),
                Err(e) => outcome.failures.push(StageFailure::permanent(Stage::Merge, e)),
            }
        }

        if let Some(vector) = embedding.filter(|_| may_write) {
            match self.indexer.index(document, vector).await {
                Ok(()) => outcome.indexed = true,
                Err(e) => outcome.failures.push(StageFailure::permanent(Stage::Index, e)),
            }
        }

        for failure in &outcome.failures {
            match failure.kind {
                FailureKind::Permanent => error!(
                    document_id = %document.id,
                    stage = %failure.stage,
                    reason = %failure.reason,
                    "document stage failed"
                ),
                FailureKind::RetryableExhausted => warn!(
                    document_id = %document.id,
                    stage = %failure.stage,
                    reason = %failure.reason,
                    "document stage exhausted retries"
                ),
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::external::ExternalError;
    use crate::extraction::MockExtractionModel;
    use crate::graph::{GraphStore, InMemoryGraphStore};
    use crate::vector::{InMemoryVectorIndex, VectorIndex};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings(independent_stages: bool) -> IngestionSettings {
        IngestionSettings {
            max_concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                timeout: Duration::from_secs(1),
            },
            independent_stages,
        }
    }

    fn working_embedder() -> MockEmbedder {
        let mut embedder = MockEmbedder::new();
        embedder.expect_dimension().return_const(2usize);
        embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        embedder
    }

    fn failing_extractor() -> MockExtractionModel {
        let mut model = MockExtractionModel::new();
        model
            .expect_extract()
            .returning(|_| Err(ExternalError::PermanentExtraction("garbage".into())));
        model
    }

    fn orchestrator(
        model: MockExtractionModel,
        embedder: MockEmbedder,
        independent_stages: bool,
    ) -> (IngestionOrchestrator, Arc<InMemoryGraphStore>, Arc<InMemoryVectorIndex>) {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorIndex::new());
        let orchestrator = IngestionOrchestrator::new(
            ExtractorAdapter::new(Arc::new(model)),
            EmbedderAdapter::new(Arc::new(embedder)),
            GraphMerger::new(graph.clone()),
            VectorIndexer::new(vectors.clone()),
            settings(independent_stages),
        );
        (orchestrator, graph, vectors)
    }

    #[tokio::test]
    async fn test_independent_stages_index_despite_extraction_failure() {
        let (orchestrator, _, vectors) =
            orchestrator(failing_extractor(), working_embedder(), true);

        let summary = orchestrator
            .ingest(vec![Document::new("d1", "some text")])
            .await;

        assert_eq!(summary.failed_permanent, 1);
        assert!(summary.outcomes[0].indexed);
        assert_eq!(vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_document_skips_models() {
        let mut model = MockExtractionModel::new();
        model.expect_extract().times(0);
        let mut embedder = MockEmbedder::new();
        embedder.expect_dimension().return_const(2usize);
        embedder.expect_embed().times(0);
        let (orchestrator, graph, vectors) = orchestrator(model, embedder, false);

        let outcome = orchestrator
            .ingest_document(&Document::new("d4", "  \n\t"))
            .await;

        assert!(outcome.succeeded());
        assert!(!outcome.indexed);
        assert_eq!(outcome.merge.map(|r| r.entities), Some(0));
        assert_eq!(graph.stats().await.unwrap().entities, 0);
        assert_eq!(vectors.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_coupled_stages_write_nothing_on_failure() {
        let (orchestrator, graph, vectors) =
            orchestrator(failing_extractor(), working_embedder(), false);

        let summary = orchestrator
            .ingest(vec![Document::new("d1", "some text")])
            .await;

        assert!(summary.is_total_failure());
        assert!(!summary.outcomes[0].indexed);
        assert_eq!(vectors.count().await.unwrap(), 0);
        assert_eq!(graph.stats().await.unwrap().entities, 0);
    }

    #[tokio::test]
    async fn test_retryable_exhausted_is_classified() {
        let mut model = MockExtractionModel::new();
        model
            .expect_extract()
            .times(2)
            .returning(|_| Err(ExternalError::RetryableExtraction("connection refused".into())));
        let (orchestrator, _, _) = orchestrator(model, working_embedder(), true);

        let summary = orchestrator
            .ingest(vec![Document::new("d1", "some text")])
            .await;

        assert_eq!(summary.failed_retryable_exhausted, 1);
        assert_eq!(summary.failed[0].failures[0].stage, Stage::Extraction);
    }

    #[test]
    fn test_empty_run_is_not_total_failure() {
        let summary = IngestionSummary::from_outcomes(Vec::new());
        assert!(!summary.is_total_failure());
    }

    #[test]
    fn test_permanent_wins_over_retryable() {
        let outcome = DocumentOutcome {
            document_id: "d1".to_string(),
            merge: None,
            indexed: false,
            failures: vec![
                StageFailure {
                    stage: Stage::Embedding,
                    kind: FailureKind::RetryableExhausted,
                    reason: "timeout".to_string(),
                },
                StageFailure::permanent(Stage::Extraction, "bad json"),
            ],
        };
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Permanent));
    }
}
