use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identity of a relationship: one edge per (source, target, label)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source: String,
    pub target: String,
    pub label: String,
}

impl RelationshipKey {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
        }
    }
}

/// Represents a relationship edge in the knowledge graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Canonical name of the source entity
    pub source: String,
    /// Canonical name of the target entity
    pub target: String,
    /// UPPER_SNAKE_CASE label
    pub label: String,
    /// Documents that observed this relationship
    #[serde(default)]
    pub provenance: BTreeSet<String>,
}

impl RelationshipEdge {
    /// Create an edge with empty provenance
    pub fn new(key: RelationshipKey) -> Self {
        Self {
            source: key.source,
            target: key.target,
            label: key.label,
            provenance: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> RelationshipKey {
        RelationshipKey::new(&self.source, &self.target, &self.label)
    }

    /// Record a supporting document. Returns true if it was new.
    pub fn add_provenance(&mut self, document_id: &str) -> bool {
        self.provenance.insert(document_id.to_string())
    }
}
