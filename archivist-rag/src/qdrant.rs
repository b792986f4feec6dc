//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Unit ids are mapped to UUIDv5 point ids. The original id, the source,
//! section, chunk index, text and metadata travel in the point payload, and
//! `source_id` carries a keyword index so per-source filters and deletes
//! stay cheap.
//!
//! # Example
//!
//! ```rust,ignore
//! use archivist_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::connect("http://localhost:6334", "papers", 768).await?;
//! store.upsert(&units).await?;
//! let hits = store.search(&query_embedding, 5, None).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, error};
use uuid::Uuid;

use crate::document::{IndexedUnit, MetadataFilter, SearchHit};
use crate::embedding::check_finite;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const SCROLL_PAGE: u32 = 256;

/// A [`VectorStore`] backed by a [Qdrant](https://qdrant.tech/) collection
/// with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
}

impl QdrantVectorStore {
    /// Connect to `url` and make sure `collection` exists.
    pub async fn connect(url: &str, collection: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Self::from_client(client, collection, dimensions).await
    }

    /// Wrap an existing client, creating `collection` if it is missing.
    pub async fn from_client(client: Qdrant, collection: &str, dimensions: usize) -> Result<Self> {
        let store = Self { client, collection: collection.to_string(), dimensions };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists =
            self.client.collection_exists(self.collection.as_str()).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(Self::map_err)?;
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "source_id",
                    FieldType::Keyword,
                )
                .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(
            collection = %self.collection,
            dimensions = self.dimensions,
            "created qdrant collection"
        );
        Ok(())
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        error!(error = %e, "qdrant request failed");
        RagError::upstream("qdrant", e.to_string())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        check_finite(vector)
    }

    /// Point id for a unit id. Qdrant only accepts integers and UUIDs.
    fn point_id(unit_id: &str) -> PointId {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, unit_id.as_bytes()).to_string().into()
    }

    fn source_filter(source_id: &str) -> Filter {
        Filter::must([Condition::matches("source_id", source_id.to_string())])
    }

    /// Translate a metadata filter into payload conditions.
    fn to_filter(filter: &MetadataFilter) -> Filter {
        Filter::must(filter.iter().map(|(key, value)| {
            let field = match key {
                "source" | "source_id" => "source_id".to_string(),
                "section" => "section".to_string(),
                other => format!("metadata.{other}"),
            };
            Condition::matches(field, value.to_string())
        }))
    }

    fn payload(unit: &IndexedUnit) -> Result<Payload> {
        let value = serde_json::json!({
            "unit_id": unit.id,
            "source_id": unit.source_id,
            "section": unit.section,
            "chunk_index": unit.chunk_index,
            "text": unit.text,
            "metadata": unit.metadata,
        });
        Payload::try_from(value).map_err(|e| RagError::upstream("qdrant", e.to_string()))
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn unit_from_payload(
        payload: &HashMap<String, QdrantValue>,
        embedding: Vec<f32>,
    ) -> IndexedUnit {
        let string = |key: &str| payload.get(key).and_then(Self::extract_string);
        let chunk_index = payload
            .get("chunk_index")
            .and_then(|v| match &v.kind {
                Some(Kind::IntegerValue(i)) => usize::try_from(*i).ok(),
                Some(Kind::DoubleValue(d)) if *d >= 0.0 => Some(*d as usize),
                _ => None,
            })
            .unwrap_or_default();
        let metadata: HashMap<String, String> = payload
            .get("metadata")
            .and_then(|v| match &v.kind {
                Some(Kind::StructValue(s)) => Some(
                    s.fields
                        .iter()
                        .filter_map(|(k, v)| Self::extract_string(v).map(|s| (k.clone(), s)))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        IndexedUnit {
            id: string("unit_id").unwrap_or_default(),
            embedding,
            source_id: string("source_id").unwrap_or_default(),
            section: string("section"),
            chunk_index,
            text: string("text").unwrap_or_default(),
            metadata,
        }
    }

    async fn count(&self, filter: Option<Filter>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        let response = self.client.count(request).await.map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, units: &[IndexedUnit]) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }
        for unit in units {
            self.check_vector(&unit.embedding)?;
        }

        let points = units
            .iter()
            .map(|unit| {
                Ok(PointStruct::new(
                    Self::point_id(&unit.id),
                    unit.embedding.clone(),
                    Self::payload(unit)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = units.len(), "upserted units to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.check_vector(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, query.to_vec(), top_k as u64)
                .with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            request = request.filter(Self::to_filter(filter));
        }
        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|scored| {
                SearchHit::new(Self::unit_from_payload(&scored.payload, Vec::new()), scored.score)
            })
            .collect())
    }

    async fn delete_by_source(&self, source_id: &str) -> Result<usize> {
        let count = self.count(Some(Self::source_filter(source_id))).await?;
        if count == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::source_filter(source_id))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, source_id, count, "deleted points from qdrant");
        Ok(count)
    }

    /// Returns payload only: vectors stay server-side and `embedding` is empty.
    async fn get_by_source(&self, source_id: &str) -> Result<Vec<IndexedUnit>> {
        let mut units = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(&self.collection)
                .filter(Self::source_filter(source_id))
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }
            let response = self.client.scroll(request).await.map_err(Self::map_err)?;
            units.extend(
                response.result.iter().map(|p| Self::unit_from_payload(&p.payload, Vec::new())),
            );
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        units.sort_by_key(|u| u.chunk_index);
        Ok(units)
    }

    async fn len(&self) -> Result<usize> {
        self.count(None).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
