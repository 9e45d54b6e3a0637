use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::embedding::EmbedderAdapter;
use crate::external::ExternalError;
use crate::graph::{canonicalize, GraphError, GraphStore, RelationshipEdge};
use crate::vector::{rank_matches, VectorIndex, VectorMatch};

pub const RAG_PROMPT_HEADER: &str = "Answer the question using only the following context:";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Entity name is empty")]
    EmptyEntityName,

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("Embedding the query failed: {0}")]
    Embedding(ExternalError),

    #[error("Vector search failed: {0}")]
    VectorSearch(ExternalError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Generates an answer from an assembled prompt. Only the CLI uses this;
/// the query service stops at the prompt.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ExternalError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity: String,
    pub display_name: String,
    pub types: BTreeSet<String>,
    pub mentioned_in_docs: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub document_id: String,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagContext {
    pub context_documents: Vec<ContextDocument>,
    pub prompt: String,
}

/// Build the RAG prompt for already ranked context texts
pub fn build_prompt<'a>(query: &str, texts: impl IntoIterator<Item = &'a str>) -> String {
    let context = texts.into_iter().collect::<Vec<_>>().join("\n\n");
    format!("{}\n{}\n\nQuestion: {}", RAG_PROMPT_HEADER, context, query)
}

/// Whether a ranked result filled `limit` while its last hit still ties the
/// k-th best score, so more tied hits may exist beyond the limit
fn ties_cut_at_limit(ranked: &[VectorMatch], top_k: usize, limit: usize) -> bool {
    if ranked.len() < limit {
        return false;
    }
    match (ranked.get(top_k - 1), ranked.last()) {
        (Some(kth), Some(last)) => last.score >= kth.score,
        _ => false,
    }
}

/// Read-only access to the graph and vector stores
#[derive(Clone)]
pub struct QueryService {
    embedder: EmbedderAdapter,
    vectors: Arc<dyn VectorIndex>,
    graph: Arc<dyn GraphStore>,
}

impl QueryService {
    pub fn new(
        embedder: EmbedderAdapter,
        vectors: Arc<dyn VectorIndex>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            graph,
        }
    }

    /// Nearest documents to `query`, best first, ties by document id
    pub async fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }

        let vector = self
            .embedder
            .embed_text(query)
            .await
            .map_err(QueryError::Embedding)?;

        // A store cuts its result at `limit` in its own tie order, so widen the
        // request until no hit tied with the k-th score can be left out
        let mut limit = top_k;
        let mut matches = loop {
            let mut matches = self
                .vectors
                .search(&vector, limit)
                .await
                .map_err(QueryError::VectorSearch)?;
            rank_matches(&mut matches);

            if !ties_cut_at_limit(&matches, top_k, limit) {
                break matches;
            }
            debug!(limit, "score tie at the result limit, widening search");
            limit = limit.saturating_mul(2);
        };

        matches.truncate(top_k);
        debug!(top_k, hits = matches.len(), "semantic search");
        Ok(matches)
    }

    /// Exact lookup of an entity by its canonical name
    pub async fn graph_search(&self, entity_name: &str) -> Result<Vec<EntityMatch>, QueryError> {
        let name = canonicalize(entity_name);
        if name.is_empty() {
            return Err(QueryError::EmptyEntityName);
        }

        let found = self.graph.entity(&name).await?;
        Ok(found
            .map(|entity| EntityMatch {
                display_name: entity.display_name().to_string(),
                entity: entity.canonical_name,
                types: entity.types,
                mentioned_in_docs: entity.mentioned_in,
            })
            .into_iter()
            .collect())
    }

    /// Relationships within `depth` hops of an entity
    pub async fn related_entities(
        &self,
        entity_name: &str,
        depth: usize,
    ) -> Result<Vec<RelationshipEdge>, QueryError> {
        let name = canonicalize(entity_name);
        if name.is_empty() {
            return Err(QueryError::EmptyEntityName);
        }
        Ok(self.graph.neighborhood(&name, depth.max(1)).await?)
    }

    /// Shortest directed chain of canonical names between two entities
    pub async fn find_path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>, QueryError> {
        let from = canonicalize(from);
        let to = canonicalize(to);
        if from.is_empty() || to.is_empty() {
            return Err(QueryError::EmptyEntityName);
        }
        Ok(self.graph.shortest_path(&from, &to).await?)
    }

    /// Retrieve context for `query` and assemble the RAG prompt. No model is
    /// called here.
    pub async fn rag_context(&self, query: &str, top_k: usize) -> Result<RagContext, QueryError> {
        let matches = self.semantic_search(query, top_k).await?;

        let context_documents: Vec<ContextDocument> = matches
            .into_iter()
            .map(|hit| ContextDocument {
                document_id: hit.document_id,
                score: hit.score,
                text: hit.content,
            })
            .collect();
        let prompt = build_prompt(query, context_documents.iter().map(|d| d.text.as_str()));

        Ok(RagContext {
            context_documents,
            prompt,
        })
    }
}
