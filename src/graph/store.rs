use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::graph::{
    edge::RelationshipEdge,
    error::GraphError,
    knowledge_graph::{ApplyOutcome, GraphSnapshot, KnowledgeGraph},
    merger::DocumentDelta,
    node::EntityNode,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: usize,
    pub relationships: usize,
}

/// Storage for the entity graph.
///
/// `apply` must be atomic per call: readers observe either none or all of a
/// document's delta.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn apply(
        &self,
        document_id: &str,
        delta: DocumentDelta,
    ) -> Result<ApplyOutcome, GraphError>;

    async fn entity(&self, canonical_name: &str) -> Result<Option<EntityNode>, GraphError>;

    async fn neighborhood(
        &self,
        canonical_name: &str,
        depth: usize,
    ) -> Result<Vec<RelationshipEdge>, GraphError>;

    async fn shortest_path(&self, from: &str, to: &str)
        -> Result<Option<Vec<String>>, GraphError>;

    async fn snapshot(&self) -> Result<GraphSnapshot, GraphError>;

    async fn stats(&self) -> Result<GraphStats, GraphError>;

    async fn reset(&self) -> Result<(), GraphError>;
}

/// Petgraph-backed store guarded by a single read/write lock
#[derive(Default)]
pub struct InMemoryGraphStore {
    graph: RwLock<KnowledgeGraph>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            graph: RwLock::new(KnowledgeGraph::from_snapshot(snapshot)),
        }
    }

    /// Load a JSON snapshot. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, GraphError> {
        if !path.exists() {
            debug!(path = %path.display(), "no graph snapshot, starting empty");
            return Ok(Self::new());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GraphError::SnapshotError(format!("{}: {}", path.display(), e)))?;
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| GraphError::SnapshotError(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            relationships = snapshot.relationships.len(),
            "loaded graph snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write a JSON snapshot next to `path` and move it into place
    pub async fn save(&self, path: &Path) -> Result<(), GraphError> {
        let snapshot = self.graph.read().await.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| GraphError::SnapshotError(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| GraphError::SnapshotError(format!("{}: {}", parent.display(), e)))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| GraphError::SnapshotError(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| GraphError::SnapshotError(format!("{}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "saved graph snapshot");
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn apply(
        &self,
        document_id: &str,
        delta: DocumentDelta,
    ) -> Result<ApplyOutcome, GraphError> {
        let mut graph = self.graph.write().await;
        Ok(graph.apply(document_id, &delta))
    }

    async fn entity(&self, canonical_name: &str) -> Result<Option<EntityNode>, GraphError> {
        Ok(self.graph.read().await.entity(canonical_name).cloned())
    }

    async fn neighborhood(
        &self,
        canonical_name: &str,
        depth: usize,
    ) -> Result<Vec<RelationshipEdge>, GraphError> {
        let graph = self.graph.read().await;
        Ok(graph
            .neighborhood(canonical_name, depth)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn shortest_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<Vec<String>>, GraphError> {
        Ok(self.graph.read().await.shortest_path(from, to))
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, GraphError> {
        Ok(self.graph.read().await.snapshot())
    }

    async fn stats(&self) -> Result<GraphStats, GraphError> {
        let graph = self.graph.read().await;
        Ok(GraphStats {
            entities: graph.entity_count(),
            relationships: graph.relationship_count(),
        })
    }

    async fn reset(&self) -> Result<(), GraphError> {
        self.graph.write().await.clear();
        Ok(())
    }
}
