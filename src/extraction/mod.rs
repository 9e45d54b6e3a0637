pub mod llm;
pub mod raw;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::document::Document;
use crate::external::ExternalError;

pub use llm::LlmExtractor;
pub use raw::RawExtraction;

/// An entity sighting as reported by the model, surface name preserved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ExtractedEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: Some(entity_type.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source_name: String,
    pub target_name: String,
    pub label: String,
}

impl ExtractedRelationship {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            label: label.into(),
        }
    }
}

/// One normalized item of extraction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphElement {
    Entity(ExtractedEntity),
    Relationship(ExtractedRelationship),
}

/// Canonical extraction output for one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    /// Raw items discarded because a required field was missing
    #[serde(default)]
    pub dropped: usize,
}

impl ExtractionResult {
    /// Build from normalized elements, collapsing exact duplicates while
    /// keeping first-seen order
    pub fn from_elements(elements: impl IntoIterator<Item = GraphElement>) -> Self {
        let mut result = Self::default();
        let mut seen_entities = HashSet::new();
        let mut seen_relationships = HashSet::new();

        for element in elements {
            match element {
                GraphElement::Entity(entity) => {
                    if seen_entities.insert(entity.clone()) {
                        result.entities.push(entity);
                    }
                }
                GraphElement::Relationship(relationship) => {
                    if seen_relationships.insert(relationship.clone()) {
                        result.relationships.push(relationship);
                    }
                }
            }
        }

        result
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

impl From<RawExtraction> for ExtractionResult {
    fn from(raw: RawExtraction) -> Self {
        let (elements, dropped) = raw.into_elements();
        let mut result = Self::from_elements(elements);
        result.dropped = dropped;
        result
    }
}

/// The extraction collaborator: text in, schema-free candidates out.
///
/// Implementations report transport problems as
/// `ExternalError::RetryableExtraction` and unusable replies as
/// `ExternalError::PermanentExtraction`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    async fn extract(&self, text: &str) -> Result<RawExtraction, ExternalError>;
}

/// Normalizes whatever the extraction model returns into an `ExtractionResult`
#[derive(Clone)]
pub struct ExtractorAdapter {
    model: Arc<dyn ExtractionModel>,
}

impl ExtractorAdapter {
    pub fn new(model: Arc<dyn ExtractionModel>) -> Self {
        Self { model }
    }

    /// Extract entities and relationships from a document. Blank documents
    /// yield an empty result without calling the model.
    pub async fn extract(&self, document: &Document) -> Result<ExtractionResult, ExternalError> {
        if document.is_blank() {
            debug!(document_id = %document.id, "blank document, skipping extraction");
            return Ok(ExtractionResult::default());
        }

        let raw = self.model.extract(&document.text).await?;
        let result = ExtractionResult::from(raw);
        debug!(
            document_id = %document.id,
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            dropped = result.dropped,
            "extraction normalized"
        );
        Ok(result)
    }
}
