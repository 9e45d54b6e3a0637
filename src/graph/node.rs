use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An entity in the knowledge graph, keyed by its canonical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNode {
    /// Identity key (see `canonical::canonicalize`)
    pub canonical_name: String,
    /// Surface forms the entity was seen under
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Type labels accumulated across documents
    #[serde(default)]
    pub types: BTreeSet<String>,
    /// Documents mentioning this entity
    #[serde(default)]
    pub mentioned_in: BTreeSet<String>,
}

impl EntityNode {
    /// Create an entity with no types and no provenance
    pub fn new(canonical_name: impl Into<String>) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            aliases: BTreeSet::new(),
            types: BTreeSet::new(),
            mentioned_in: BTreeSet::new(),
        }
    }

    /// Union another sighting into this entity. Returns true if anything changed.
    pub fn absorb<'a>(
        &mut self,
        document_id: &str,
        aliases: impl IntoIterator<Item = &'a String>,
        types: impl IntoIterator<Item = &'a String>,
    ) -> bool {
        let mut changed = self.mentioned_in.insert(document_id.to_string());
        for alias in aliases {
            changed |= self.aliases.insert(alias.clone());
        }
        for entity_type in types {
            changed |= self.types.insert(entity_type.clone());
        }
        changed
    }

    /// Name to show a reader: the first alias in sort order, or the canonical key
    pub fn display_name(&self) -> &str {
        self.aliases
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or(&self.canonical_name)
    }
}
