use petgraph::{
    algo::astar,
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::graph::{
    edge::{RelationshipEdge, RelationshipKey},
    merger::DocumentDelta,
    node::EntityNode,
};

/// Counts of what a single document delta did to the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
}

/// Order-independent dump of the graph, used for persistence and comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub entities: Vec<EntityNode>,
    pub relationships: Vec<RelationshipEdge>,
}

/// The corpus-wide entity graph
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    /// The underlying graph structure
    graph: DiGraph<EntityNode, RelationshipEdge>,
    /// Canonical name to node index
    node_map: HashMap<String, NodeIndex>,
    /// One edge per relationship key
    edge_map: HashMap<RelationshipKey, EdgeIndex>,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            edge_map: HashMap::new(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn ensure_entity(&mut self, canonical_name: &str) -> (NodeIndex, bool) {
        if let Some(idx) = self.node_map.get(canonical_name) {
            return (*idx, false);
        }
        let idx = self.graph.add_node(EntityNode::new(canonical_name));
        self.node_map.insert(canonical_name.to_string(), idx);
        (idx, true)
    }

    /// Union one document's delta into the graph.
    ///
    /// Every step is a set-union keyed by canonical name or relationship key,
    /// so applying the same delta again leaves the graph unchanged.
    pub fn apply(&mut self, document_id: &str, delta: &DocumentDelta) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        for (name, entity) in &delta.entities {
            let (idx, created) = self.ensure_entity(name);
            let changed = self.graph[idx].absorb(document_id, &entity.aliases, &entity.types);
            if created {
                outcome.entities_created += 1;
            } else if changed {
                outcome.entities_updated += 1;
            }
        }

        for key in &delta.relationships {
            let (from_idx, _) = self.ensure_entity(&key.source);
            let (to_idx, _) = self.ensure_entity(&key.target);

            match self.edge_map.get(key) {
                Some(edge_idx) => {
                    if self.graph[*edge_idx].add_provenance(document_id) {
                        outcome.relationships_updated += 1;
                    }
                }
                None => {
                    let mut edge = RelationshipEdge::new(key.clone());
                    edge.add_provenance(document_id);
                    let edge_idx = self.graph.add_edge(from_idx, to_idx, edge);
                    self.edge_map.insert(key.clone(), edge_idx);
                    outcome.relationships_created += 1;
                }
            }
        }

        outcome
    }

    /// Exact lookup by canonical name
    pub fn entity(&self, canonical_name: &str) -> Option<&EntityNode> {
        self.node_map.get(canonical_name).map(|idx| &self.graph[*idx])
    }

    pub fn relationship(&self, key: &RelationshipKey) -> Option<&RelationshipEdge> {
        self.edge_map.get(key).map(|idx| &self.graph[*idx])
    }

    /// All entities, sorted by canonical name
    pub fn entities(&self) -> Vec<&EntityNode> {
        let mut entities: Vec<&EntityNode> = self.graph.node_weights().collect();
        entities.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        entities
    }

    /// Edges reachable within `depth` hops of an entity, following edges in
    /// either direction. Empty when the entity is unknown.
    pub fn neighborhood(&self, canonical_name: &str, depth: usize) -> Vec<&RelationshipEdge> {
        let Some(start) = self.node_map.get(canonical_name) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeIndex> = HashSet::from([*start]);
        let mut seen_edges: HashSet<EdgeIndex> = HashSet::new();
        let mut frontier = vec![*start];

        for _ in 0..depth {
            let mut next = Vec::new();
            for node in frontier {
                let touching = self
                    .graph
                    .edges_directed(node, Direction::Outgoing)
                    .chain(self.graph.edges_directed(node, Direction::Incoming));
                for edge in touching {
                    seen_edges.insert(edge.id());
                    let other = if edge.source() == node {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    if visited.insert(other) {
                        next.push(other);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut edges: Vec<&RelationshipEdge> =
            seen_edges.into_iter().map(|idx| &self.graph[idx]).collect();
        edges.sort_by_key(|edge| edge.key());
        edges
    }

    /// Shortest directed chain of canonical names from `from` to `to`
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let start = *self.node_map.get(from)?;
        let goal = *self.node_map.get(to)?;

        astar(&self.graph, start, |n| n == goal, |_| 1usize, |_| 0usize).map(|(_, path)| {
            path.into_iter()
                .map(|idx| self.graph[idx].canonical_name.clone())
                .collect()
        })
    }

    /// Sorted, order-independent view of the whole graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let entities = self.entities().into_iter().cloned().collect();
        let mut relationships: Vec<RelationshipEdge> = self.graph.edge_weights().cloned().collect();
        relationships.sort_by(|a, b| a.key().cmp(&b.key()));
        GraphSnapshot {
            entities,
            relationships,
        }
    }

    /// Rebuild a graph from a snapshot
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for entity in snapshot.entities {
            let name = entity.canonical_name.clone();
            let idx = graph.graph.add_node(entity);
            graph.node_map.insert(name, idx);
        }
        for edge in snapshot.relationships {
            let (from_idx, _) = graph.ensure_entity(&edge.source);
            let (to_idx, _) = graph.ensure_entity(&edge.target);
            let key = edge.key();
            let edge_idx = graph.graph.add_edge(from_idx, to_idx, edge);
            graph.edge_map.insert(key, edge_idx);
        }
        graph
    }

    /// Drop every entity and relationship
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_map.clear();
        self.edge_map.clear();
    }
}
