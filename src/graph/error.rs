use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Merge failed for document {document_id}: {reason}")]
    MergeFailure { document_id: String, reason: String },

    #[error("Graph store error: {0}")]
    StoreError(String),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),
}
