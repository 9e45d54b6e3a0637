#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knowledge_graph_builder::{
    extraction::RawExtraction, Document, Embedder, EmbedderAdapter, ExternalError,
    ExtractionModel, ExtractorAdapter, GraphMerger, GraphStore, InMemoryGraphStore,
    InMemoryVectorIndex, IngestionOrchestrator, IngestionSettings, QueryService, RetryPolicy,
    VectorIndexer,
};

/// What the scripted extractor does for one piece of text
pub enum Script {
    Reply(String),
    Permanent,
    /// Fail transiently this many times, then reply
    Flaky(AtomicUsize, String),
    AlwaysTransient,
}

/// Extraction model answering from a fixed table keyed by document text
#[derive(Default)]
pub struct ScriptedExtractor {
    scripts: HashMap<String, Script>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, text: &str, json: &str) -> Self {
        self.scripts
            .insert(text.to_string(), Script::Reply(json.to_string()));
        self
    }

    pub fn permanent(mut self, text: &str) -> Self {
        self.scripts.insert(text.to_string(), Script::Permanent);
        self
    }

    pub fn flaky(mut self, text: &str, failures: usize, json: &str) -> Self {
        self.scripts.insert(
            text.to_string(),
            Script::Flaky(AtomicUsize::new(failures), json.to_string()),
        );
        self
    }

    pub fn always_transient(mut self, text: &str) -> Self {
        self.scripts
            .insert(text.to_string(), Script::AlwaysTransient);
        self
    }
}

fn parse(json: &str) -> Result<RawExtraction, ExternalError> {
    serde_json::from_str(json).map_err(|e| ExternalError::PermanentExtraction(e.to_string()))
}

#[async_trait]
impl ExtractionModel for ScriptedExtractor {
    async fn extract(&self, text: &str) -> Result<RawExtraction, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(text) {
            Some(Script::Reply(json)) => parse(json),
            Some(Script::Permanent) => Err(ExternalError::PermanentExtraction(
                "model replied with prose".to_string(),
            )),
            Some(Script::Flaky(remaining, json)) => {
                let left = remaining.load(Ordering::SeqCst);
                if left > 0 {
                    remaining.store(left - 1, Ordering::SeqCst);
                    Err(ExternalError::RetryableExtraction(
                        "connection reset".to_string(),
                    ))
                } else {
                    parse(json)
                }
            }
            Some(Script::AlwaysTransient) => Err(ExternalError::RetryableExtraction(
                "service unavailable".to_string(),
            )),
            None => Ok(RawExtraction::default()),
        }
    }
}

pub const VOCABULARY: &[&str] = &[
    "phoenix", "project", "alice", "bob", "leads", "supports", "innovate", "orbitsystem",
];

/// Deterministic bag-of-words embedder over a small vocabulary
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .map(|w| w.to_lowercase())
            .collect();
        Ok(VOCABULARY
            .iter()
            .map(|term| words.iter().filter(|w| w.as_str() == *term).count() as f32)
            .collect())
    }
}

pub fn fast_settings() -> IngestionSettings {
    IngestionSettings {
        max_concurrency: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(2),
        },
        independent_stages: true,
    }
}

/// Fully in-memory wiring of ingestion and querying
pub struct Harness {
    pub graph: Arc<InMemoryGraphStore>,
    pub vectors: Arc<InMemoryVectorIndex>,
    pub orchestrator: IngestionOrchestrator,
    pub query: QueryService,
}

impl Harness {
    pub fn new(extractor: Arc<dyn ExtractionModel>) -> Self {
        Self::with_graph(extractor, Arc::new(InMemoryGraphStore::new()))
    }

    pub fn with_graph(extractor: Arc<dyn ExtractionModel>, graph: Arc<InMemoryGraphStore>) -> Self {
        Self::with_store(extractor, graph.clone(), graph)
    }

    /// Merge through `merge_store` while queries read `graph`
    pub fn with_store(
        extractor: Arc<dyn ExtractionModel>,
        graph: Arc<InMemoryGraphStore>,
        merge_store: Arc<dyn GraphStore>,
    ) -> Self {
        let vectors = Arc::new(InMemoryVectorIndex::new());
        let embedder = EmbedderAdapter::new(Arc::new(KeywordEmbedder));

        let orchestrator = IngestionOrchestrator::new(
            ExtractorAdapter::new(extractor),
            embedder.clone(),
            GraphMerger::new(merge_store),
            VectorIndexer::new(vectors.clone()),
            fast_settings(),
        );
        let query = QueryService::new(embedder, vectors.clone(), graph.clone());

        Self {
            graph,
            vectors,
            orchestrator,
            query,
        }
    }
}

pub const D1: &str = "Alice leads Phoenix Project";
pub const D2: &str = "Bob supports Phoenix Project";
pub const D3: &str = "Garbled memo about Globex";

pub const D1_EXTRACTION: &str = r#"{
    "entities": [
        {"name": "Alice", "type": "Person"},
        {"name": "Phoenix Project", "type": "Project"}
    ],
    "relationships": [
        {"source": "Alice", "target": "Phoenix Project", "label": "LEADS"}
    ]
}"#;

pub const D2_EXTRACTION: &str = r#"{
    "entities": [
        {"name": "Bob", "type": "Person"},
        {"name": "phoenix  project", "type": "Project"}
    ],
    "relationships": [
        {"source": "Bob", "target": "Phoenix Project", "label": "supports"}
    ]
}"#;

pub fn corpus() -> Vec<Document> {
    vec![
        Document::new("d1", D1).with_metadata("source", "Slack Channel"),
        Document::new("d2", D2).with_metadata("source", "Email Archive"),
    ]
}

pub fn scripted() -> ScriptedExtractor {
    ScriptedExtractor::new()
        .reply(D1, D1_EXTRACTION)
        .reply(D2, D2_EXTRACTION)
}
