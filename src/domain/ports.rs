use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a bulk operation is applied. Both forms are keyed by natural id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Merge into the existing document, creating it when absent.
    Upsert,
    /// Merge into an existing document; a missing document is a per-item failure.
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOperation {
    pub index: String,
    pub id: String,
    pub action: BulkAction,
    pub doc: Value,
}

impl BulkOperation {
    pub fn upsert(index: &str, id: impl Into<String>, doc: Value) -> Self {
        Self {
            index: index.to_string(),
            id: id.into(),
            action: BulkAction::Upsert,
            doc,
        }
    }

    pub fn update(index: &str, id: impl Into<String>, doc: Value) -> Self {
        Self {
            index: index.to_string(),
            id: id.into(),
            action: BulkAction::Update,
            doc,
        }
    }
}

/// A single document the store refused during a bulk write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: String,
    pub status: u16,
    pub error_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub success: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Ranked full-text match over the given fields.
    Text { query: String, fields: Vec<String> },
    /// Documents ordered by distance from a point (requires a `location` field).
    Nearest { lat: f64, lon: f64 },
    /// Exact match of `field` against any of `values`.
    Terms { field: String, values: Vec<String> },
}

/// For [`SearchQuery::Nearest`] the score is the distance in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub source: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>>;

    /// Results line up with `ids`; missing documents are `None`.
    async fn multi_get(&self, index: &str, ids: &[String]) -> Result<Vec<Option<Value>>>;

    async fn search(&self, index: &str, query: &SearchQuery, size: usize)
        -> Result<SearchResults>;

    /// Per-document rejections come back in the response; only transport or
    /// whole-request failures are errors.
    async fn bulk_write(&self, operations: &[BulkOperation]) -> Result<BulkResponse>;

    async fn exists(&self, index: &str, id: &str) -> Result<bool>;

    async fn create_index(&self, index: &str, mapping: &Value, reset: bool) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
}
