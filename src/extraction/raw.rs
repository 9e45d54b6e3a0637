//! Wire shapes accepted from extraction models.
//!
//! Models disagree on field names and nesting, so everything here is
//! optional and aliased. Nothing in this module is trusted past
//! [`RawExtraction::into_elements`], which drops what cannot be used.

use serde::Deserialize;

use crate::extraction::{ExtractedEntity, ExtractedRelationship, GraphElement};
use crate::graph::canonical::tidy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default, alias = "nodes")]
    pub entities: Vec<RawEntity>,
    #[serde(default, alias = "relations", alias = "edges")]
    pub relationships: Vec<RawRelationship>,
    /// Flat, tagged list of mixed elements
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawElement {
    Entity(RawEntity),
    Relationship(RawRelationship),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// A relationship endpoint is either a bare name or a nested node
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEndpoint {
    Name(String),
    Node(RawEntity),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRelationship {
    #[serde(default, alias = "source_name", alias = "from", alias = "head")]
    pub source: Option<RawEndpoint>,
    #[serde(default, alias = "target_name", alias = "to", alias = "tail")]
    pub target: Option<RawEndpoint>,
    #[serde(default, alias = "relation", alias = "type", alias = "relationship")]
    pub label: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| tidy(v)).filter(|v| !v.is_empty())
}

impl RawEntity {
    fn resolved_name(&self) -> Option<String> {
        non_empty(self.name.as_ref()).or_else(|| non_empty(self.id.as_ref()))
    }

    fn resolved_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for entity_type in self
            .types
            .iter()
            .chain(self.entity_type.iter())
            .chain(self.label.iter())
        {
            let entity_type = tidy(entity_type);
            if !entity_type.is_empty() && !types.contains(&entity_type) {
                types.push(entity_type);
            }
        }
        types
    }

    fn push_elements(&self, elements: &mut Vec<GraphElement>) -> bool {
        let Some(name) = self.resolved_name() else {
            return false;
        };
        let types = self.resolved_types();
        if types.is_empty() {
            elements.push(GraphElement::Entity(ExtractedEntity::untyped(name)));
        } else {
            for entity_type in types {
                let entity = ExtractedEntity::new(name.clone(), entity_type);
                elements.push(GraphElement::Entity(entity));
            }
        }
        true
    }
}

impl RawEndpoint {
    /// Endpoint name, pushing a typed entity element for nested nodes
    fn resolve(&self, elements: &mut Vec<GraphElement>) -> Option<String> {
        match self {
            RawEndpoint::Name(name) => non_empty(Some(name)),
            RawEndpoint::Node(node) => {
                let name = node.resolved_name()?;
                if !node.resolved_types().is_empty() {
                    node.push_elements(elements);
                }
                Some(name)
            }
        }
    }
}

impl RawRelationship {
    fn push_elements(&self, elements: &mut Vec<GraphElement>) -> bool {
        let mut endpoint_elements = Vec::new();
        let source = self.source.as_ref().and_then(|s| s.resolve(&mut endpoint_elements));
        let target = self.target.as_ref().and_then(|t| t.resolve(&mut endpoint_elements));
        let label = non_empty(self.label.as_ref());

        match (source, target, label) {
            (Some(source_name), Some(target_name), Some(label)) => {
                elements.append(&mut endpoint_elements);
                elements.push(GraphElement::Relationship(ExtractedRelationship {
                    source_name,
                    target_name,
                    label,
                }));
                true
            }
            _ => false,
        }
    }
}

impl RawExtraction {
    /// Flatten into the sum type, returning the elements and how many raw
    /// items had to be dropped
    pub fn into_elements(self) -> (Vec<GraphElement>, usize) {
        let mut elements = Vec::new();
        let mut dropped = 0;

        let tagged_entities = self.elements.iter().filter_map(|element| match element {
            RawElement::Entity(entity) => Some(entity),
            RawElement::Relationship(_) => None,
        });
        for entity in self.entities.iter().chain(tagged_entities) {
            if !entity.push_elements(&mut elements) {
                dropped += 1;
            }
        }

        let tagged_relationships = self.elements.iter().filter_map(|element| match element {
            RawElement::Relationship(relationship) => Some(relationship),
            RawElement::Entity(_) => None,
        });
        for relationship in self.relationships.iter().chain(tagged_relationships) {
            if !relationship.push_elements(&mut elements) {
                dropped += 1;
            }
        }

        (elements, dropped)
    }
}
