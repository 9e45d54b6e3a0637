use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::extraction::ExtractionResult;
use crate::graph::{
    canonical::{canonical_label, canonicalize, tidy},
    edge::RelationshipKey,
    error::GraphError,
    knowledge_graph::ApplyOutcome,
    store::GraphStore,
};

/// What one document contributes to a single entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDelta {
    pub aliases: BTreeSet<String>,
    pub types: BTreeSet<String>,
}

/// Everything one document contributes to the graph, keyed by canonical
/// identity. Applied by the store as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentDelta {
    pub entities: BTreeMap<String, EntityDelta>,
    pub relationships: BTreeSet<RelationshipKey>,
}

impl DocumentDelta {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Result of merging one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub document_id: String,
    /// Distinct canonical entities touched, placeholders included
    pub entities: usize,
    pub relationships: usize,
    /// Relationship endpoints that had no matching entity in the extraction
    pub placeholders: usize,
    /// Extraction items that were unusable after canonicalization
    pub dropped: usize,
    pub outcome: ApplyOutcome,
}

/// Canonicalizes extraction output and hands it to the graph store
#[derive(Clone)]
pub struct GraphMerger {
    store: Arc<dyn GraphStore>,
}

impl GraphMerger {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Build the canonical delta for one extraction result.
    ///
    /// Returns the delta, the number of placeholder entities it introduced
    /// and the number of items dropped for canonicalizing to nothing.
    pub fn plan(extraction: &ExtractionResult) -> (DocumentDelta, usize, usize) {
        let mut delta = DocumentDelta::default();
        let mut dropped = 0;

        for entity in &extraction.entities {
            let name = canonicalize(&entity.name);
            if name.is_empty() {
                dropped += 1;
                continue;
            }
            let entry = delta.entities.entry(name).or_default();
            entry.aliases.insert(tidy(&entity.name));
            if let Some(entity_type) = entity.entity_type.as_deref().map(tidy) {
                if !entity_type.is_empty() {
                    entry.types.insert(entity_type);
                }
            }
        }

        let mut placeholders = 0;
        for relationship in &extraction.relationships {
            let source = canonicalize(&relationship.source_name);
            let target = canonicalize(&relationship.target_name);
            let label = canonical_label(&relationship.label);
            if source.is_empty() || target.is_empty() || label.is_empty() {
                dropped += 1;
                continue;
            }

            for (canonical, surface) in [
                (&source, &relationship.source_name),
                (&target, &relationship.target_name),
            ] {
                if !delta.entities.contains_key(canonical) {
                    placeholders += 1;
                    let mut placeholder = EntityDelta::default();
                    placeholder.aliases.insert(tidy(surface));
                    delta.entities.insert(canonical.clone(), placeholder);
                }
            }

            delta
                .relationships
                .insert(RelationshipKey::new(source, target, label));
        }

        (delta, placeholders, dropped)
    }

    /// Merge one document's extraction into the graph
    pub async fn merge(
        &self,
        document_id: &str,
        extraction: &ExtractionResult,
    ) -> Result<MergeReport, GraphError> {
        let (delta, placeholders, dropped) = Self::plan(extraction);

        let outcome = if delta.is_empty() {
            debug!(document_id, "nothing to merge");
            ApplyOutcome::default()
        } else {
            self.store
                .apply(document_id, delta.clone())
                .await
                .map_err(|e| GraphError::MergeFailure {
                    document_id: document_id.to_string(),
                    reason: e.to_string(),
                })?
        };

        info!(
            document_id,
            entities = delta.entities.len(),
            relationships = delta.relationships.len(),
            created = outcome.entities_created,
            "merged document into graph"
        );

        Ok(MergeReport {
            document_id: document_id.to_string(),
            entities: delta.entities.len(),
            relationships: delta.relationships.len(),
            placeholders,
            dropped: dropped + extraction.dropped,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractedEntity, ExtractedRelationship};
    use crate::graph::store::{InMemoryGraphStore, MockGraphStore};

    fn extraction(
        entities: Vec<ExtractedEntity>,
        relationships: Vec<ExtractedRelationship>,
    ) -> ExtractionResult {
        ExtractionResult {
            entities,
            relationships,
            dropped: 0,
        }
    }

    #[test]
    fn test_plan_canonicalizes_and_unions() {
        let result = extraction(
            vec![
                ExtractedEntity::new("Innovate  Inc", "Organization"),
                ExtractedEntity::new("innovate inc", "Vendor"),
            ],
            vec![],
        );

        let (delta, placeholders, dropped) = GraphMerger::plan(&result);
        assert_eq!(placeholders, 0);
        assert_eq!(dropped, 0);
        assert_eq!(delta.entities.len(), 1);

        let entity = &delta.entities["innovate inc"];
        assert_eq!(entity.types.len(), 2);
        assert!(entity.aliases.contains("Innovate Inc"));
        assert!(entity.aliases.contains("innovate inc"));
    }

    #[test]
    fn test_plan_dangling_relationship_creates_placeholders() {
        let result = extraction(
            vec![ExtractedEntity::new("Alice", "Person")],
            vec![ExtractedRelationship::new("Alice", "Phoenix Project", "leads")],
        );

        let (delta, placeholders, _) = GraphMerger::plan(&result);
        assert_eq!(placeholders, 1);
        assert!(delta.entities["phoenix project"].types.is_empty());
        assert!(delta
            .relationships
            .contains(&RelationshipKey::new("alice", "phoenix project", "LEADS")));
    }

    #[test]
    fn test_plan_drops_blank_names() {
        let result = extraction(
            vec![ExtractedEntity::untyped("   ")],
            vec![ExtractedRelationship::new("Alice", "  ", "USES")],
        );

        let (delta, _, dropped) = GraphMerger::plan(&result);
        assert!(delta.is_empty());
        assert_eq!(dropped, 2);
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let store = Arc::new(InMemoryGraphStore::new());
        let merger = GraphMerger::new(store.clone());
        let result = extraction(
            vec![ExtractedEntity::new("Alice", "Person")],
            vec![ExtractedRelationship::new("Alice", "Phoenix Project", "LEADS")],
        );

        let first = merger.merge("d1", &result).await.unwrap();
        assert_eq!(first.outcome.entities_created, 2);
        let before = store.snapshot().await.unwrap();

        let second = merger.merge("d1", &result).await.unwrap();
        assert_eq!(second.outcome, ApplyOutcome::default());
        assert_eq!(store.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_store_failure_is_merge_failure() {
        let mut mock = MockGraphStore::new();
        mock.expect_apply()
            .times(1)
            .returning(|_, _| Err(GraphError::StoreError("disk full".to_string())));

        let merger = GraphMerger::new(Arc::new(mock));
        let result = extraction(vec![ExtractedEntity::new("Alice", "Person")], vec![]);

        match merger.merge("d3", &result).await {
            Err(GraphError::MergeFailure {
                document_id,
                reason,
            }) => {
                assert_eq!(document_id, "d3");
                assert!(reason.contains("disk full"));
            }
            other => panic!("expected MergeFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_extraction_skips_store() {
        let mut mock = MockGraphStore::new();
        mock.expect_apply().times(0);

        let merger = GraphMerger::new(Arc::new(mock));
        let report = merger.merge("d1", &ExtractionResult::default()).await.unwrap();
        assert_eq!(report.entities, 0);
    }
}
