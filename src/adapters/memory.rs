//! In-process document store for tests and local demos.

use crate::domain::model::LatLon;
use crate::domain::ports::{
    BulkAction, BulkFailure, BulkOperation, BulkResponse, DocumentStore, SearchHit, SearchQuery,
    SearchResults,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Index = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    indices: Arc<RwLock<HashMap<String, Index>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, index: &str, id: &str, doc: Value) {
        let mut indices = self.indices.write().await;
        indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    pub async fn count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

/// Objects merge key by key; anything else replaces.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Field text, following dotted paths and flattening arrays.
fn field_text(doc: &Value, path: &str) -> Vec<String> {
    let mut current = vec![doc];
    for part in path.split('.') {
        current = current
            .into_iter()
            .filter_map(|v| v.get(part))
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
    }
    current
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Every query token must appear in one of `fields`; exact whole-field
/// matches score higher.
fn text_score(doc: &Value, query: &str, fields: &[String]) -> Option<f64> {
    let wanted: Vec<String> = tokens(query).collect();
    if wanted.is_empty() {
        return None;
    }
    let texts: Vec<String> = fields.iter().flat_map(|f| field_text(doc, f)).collect();
    let available: Vec<String> = texts.iter().flat_map(|t| tokens(t)).collect();
    if !wanted.iter().all(|w| available.contains(w)) {
        return None;
    }
    let exact = texts.iter().any(|t| t.eq_ignore_ascii_case(query.trim()));
    Some(wanted.len() as f64 + if exact { 10.0 } else { 0.0 })
}

fn location(doc: &Value) -> Option<LatLon> {
    serde_json::from_value(doc.get("location")?.clone()).ok()
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let indices = self.indices.read().await;
        Ok(indices.get(index).and_then(|docs| docs.get(id)).cloned())
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> Result<Vec<Option<Value>>> {
        let indices = self.indices.read().await;
        let docs = indices.get(index);
        Ok(ids
            .iter()
            .map(|id| docs.and_then(|d| d.get(id)).cloned())
            .collect())
    }

    async fn search(&self, index: &str, query: &SearchQuery, size: usize) -> Result<SearchResults> {
        let indices = self.indices.read().await;
        let Some(docs) = indices.get(index) else {
            return Ok(SearchResults::default());
        };

        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter_map(|(id, doc)| {
                let score = match query {
                    SearchQuery::Text { query, fields } => text_score(doc, query, fields)?,
                    SearchQuery::Nearest { lat, lon } => location(doc)?.distance_to(&LatLon {
                        lat: *lat,
                        lon: *lon,
                    }),
                    SearchQuery::Terms { field, values } => {
                        let found = field_text(doc, field);
                        if !found.iter().any(|f| values.contains(f)) {
                            return None;
                        }
                        1.0
                    }
                };
                Some(SearchHit {
                    id: id.clone(),
                    score,
                    source: doc.clone(),
                })
            })
            .collect();

        match query {
            SearchQuery::Nearest { .. } => hits.sort_by(|a, b| a.score.total_cmp(&b.score)),
            _ => hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))),
        }
        let total = hits.len() as u64;
        hits.truncate(size);
        Ok(SearchResults { total, hits })
    }

    async fn bulk_write(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
        let mut indices = self.indices.write().await;
        let mut response = BulkResponse::default();
        for op in operations {
            let docs = indices.entry(op.index.clone()).or_default();
            if let Some(existing) = docs.get_mut(&op.id) {
                merge(existing, op.doc.clone());
                response.success += 1;
                continue;
            }
            match op.action {
                BulkAction::Upsert => {
                    docs.insert(op.id.clone(), op.doc.clone());
                    response.success += 1;
                }
                BulkAction::Update => response.failures.push(BulkFailure {
                    id: op.id.clone(),
                    status: 404,
                    error_type: "document_missing_exception".to_string(),
                    reason: format!("[{}]: document missing", op.id),
                }),
            }
        }
        Ok(response)
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool> {
        let indices = self.indices.read().await;
        Ok(indices.get(index).is_some_and(|docs| docs.contains_key(id)))
    }

    async fn create_index(&self, index: &str, _mapping: &Value, reset: bool) -> Result<()> {
        let mut indices = self.indices.write().await;
        if reset {
            indices.remove(index);
        }
        indices.entry(index.to_string()).or_default();
        Ok(())
    }
}
