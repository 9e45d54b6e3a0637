use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, CollectionExistsRequest, CountPointsBuilder, CreateCollectionBuilder,
        DeleteCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
        Value, VectorParamsBuilder,
    },
    Payload, Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::document::{Metadata, MetadataValue};
use crate::external::error::ExternalError;
use crate::vector::{rank_matches, EmbeddingRecord, VectorIndex, VectorMatch};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDBConfig {
    pub collection_name: String,
    pub host: String,
    pub port: u16,
    pub vector_size: usize,
}

impl VectorDBConfig {
    /// Get the full URL for the Qdrant service
    pub fn get_url(&self) -> Result<String, ExternalError> {
        let url = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        };

        // Validate the URL
        Url::parse(&url).map_err(|e| ExternalError::ConfigError(format!("Invalid URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for VectorDBConfig {
    fn default() -> Self {
        Self {
            collection_name: "documents".to_string(),
            host: "localhost".to_string(),
            port: 6334,
            vector_size: 384,
        }
    }
}

/// Qdrant point id for a document. Stable, so re-indexing overwrites.
pub fn point_id(document_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, document_id.as_bytes()).to_string()
}

/// Wrapper for Qdrant vector database
pub struct VectorDB {
    client: Qdrant,
    config: VectorDBConfig,
    collection_ready: OnceCell<()>,
}

impl VectorDB {
    /// Create a new vector database client with the given configuration
    pub fn new(config: VectorDBConfig) -> Result<Self, ExternalError> {
        let url = config.get_url()?;
        let client = Qdrant::from_url(&url)
            .build()
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            collection_ready: OnceCell::new(),
        })
    }

    /// Create the collection with cosine distance unless it already exists
    pub async fn init_collection(&self) -> Result<(), ExternalError> {
        self.collection_ready
            .get_or_try_init(|| self.create_collection_if_missing())
            .await
            .map(|_| ())
    }

    async fn collection_exists(&self) -> Result<bool, ExternalError> {
        self.client
            .collection_exists(CollectionExistsRequest {
                collection_name: self.config.collection_name.clone(),
            })
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))
    }

    async fn create_collection_if_missing(&self) -> Result<(), ExternalError> {
        let name = &self.config.collection_name;
        if self.collection_exists().await? {
            debug!(collection = %name, "collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    self.config.vector_size as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        info!(collection = %name, size = self.config.vector_size, "created collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for VectorDB {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), ExternalError> {
        self.init_collection().await?;

        let payload = Payload::try_from(serde_json::json!({
            "document_id": record.document_id,
            "content": record.content,
            "metadata": record.metadata,
        }))
        .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        let point = PointStruct::new(point_id(&record.document_id), record.vector, payload);

        self.client
            .upsert_points(
                UpsertPointsBuilder::new(&self.config.collection_name, vec![point]).wait(true),
            )
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, ExternalError> {
        self.init_collection().await?;

        let request =
            SearchPointsBuilder::new(&self.config.collection_name, vector.to_vec(), top_k as u64)
                .with_payload(true);
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        let mut matches: Vec<VectorMatch> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let document_id = payload_text(&point.payload, "document_id")?;
                Some(VectorMatch {
                    document_id,
                    score: point.score,
                    content: payload_text(&point.payload, "content").unwrap_or_default(),
                    metadata: payload_metadata(&point.payload),
                })
            })
            .collect();

        // Qdrant orders equal scores by point id, not document id
        rank_matches(&mut matches);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize, ExternalError> {
        self.init_collection().await?;

        let response = self
            .client
            .count(CountPointsBuilder::new(&self.config.collection_name).exact(true))
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn reset(&self) -> Result<(), ExternalError> {
        let name = &self.config.collection_name;
        if self.collection_exists().await? {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(name))
                .await
                .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;
            info!(collection = %name, "deleted collection");
        }
        self.create_collection_if_missing().await
    }
}

fn payload_text(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<MetadataValue> {
    match value.kind.as_ref()? {
        Kind::StringValue(s) => Some(MetadataValue::Text(s.clone())),
        Kind::IntegerValue(i) => Some(MetadataValue::Integer(*i)),
        Kind::DoubleValue(x) => Some(MetadataValue::Float(*x)),
        Kind::BoolValue(b) => Some(MetadataValue::Bool(*b)),
        _ => None,
    }
}

fn payload_metadata(payload: &HashMap<String, Value>) -> Metadata {
    match payload.get("metadata").and_then(|v| v.kind.as_ref()) {
        Some(Kind::StructValue(fields)) => fields
            .fields
            .iter()
            .filter_map(|(key, value)| scalar(value).map(|v| (key.clone(), v)))
            .collect(),
        _ => Metadata::new(),
    }
}
