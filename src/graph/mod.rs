pub mod canonical;
pub mod edge;
pub mod error;
pub mod knowledge_graph;
pub mod merger;
pub mod node;
pub mod store;

pub use canonical::canonicalize;
pub use edge::{RelationshipEdge, RelationshipKey};
pub use error::GraphError;
pub use knowledge_graph::{ApplyOutcome, GraphSnapshot, KnowledgeGraph};
pub use merger::{DocumentDelta, EntityDelta, GraphMerger, MergeReport};
pub use node::EntityNode;
pub use store::{GraphStats, GraphStore, InMemoryGraphStore};
