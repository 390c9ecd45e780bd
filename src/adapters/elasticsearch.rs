//! Elasticsearch document store over its REST API.

use crate::domain::ports::{
    BulkAction, BulkFailure, BulkOperation, BulkResponse, DocumentStore, SearchHit, SearchQuery,
    SearchResults,
};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct MgetResponse {
    docs: Vec<MgetDoc>,
}

#[derive(Debug, Deserialize)]
struct MgetDoc {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: Option<TotalHits>,
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    #[serde(default)]
    errors: bool,
    /// Single-key objects keyed by the action name.
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: String,
    status: u16,
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    reason: String,
}

impl ElasticsearchStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| EtlError::InvalidConfigValueError {
            field: "store.url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(EtlError::InvalidConfigValueError {
                field: "store.url".to_string(),
                value: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }
        Ok(Self { client, base })
    }

    /// Percent-encodes each segment; postcode ids contain spaces.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(EtlError::StoreResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn query_body(query: &SearchQuery, size: usize) -> Value {
        match query {
            SearchQuery::Text { query, fields } => json!({
                "size": size,
                "track_total_hits": true,
                "query": {
                    "multi_match": {
                        "query": query,
                        "fields": fields,
                        "type": "best_fields",
                        "operator": "and",
                    }
                }
            }),
            SearchQuery::Nearest { lat, lon } => json!({
                "size": size,
                "query": {"exists": {"field": "location"}},
                "sort": [{
                    "_geo_distance": {
                        "location": {"lat": lat, "lon": lon},
                        "order": "asc",
                        "unit": "m",
                    }
                }]
            }),
            SearchQuery::Terms { field, values } => json!({
                "size": size,
                "track_total_hits": true,
                "query": {"terms": {field.as_str(): values}}
            }),
        }
    }

    fn bulk_body(operations: &[BulkOperation]) -> Result<String> {
        let mut body = String::new();
        for op in operations {
            let header = json!({"update": {"_index": op.index, "_id": op.id}});
            let payload = match op.action {
                BulkAction::Upsert => json!({"doc": op.doc, "doc_as_upsert": true}),
                BulkAction::Update => json!({"doc": op.doc}),
            };
            body.push_str(&serde_json::to_string(&header)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&payload)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.client.head(self.endpoint(&[index])).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(self.endpoint(&[index, "_doc", id]))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: MgetDoc = Self::check(response).await?.json().await?;
        Ok(doc.source.filter(|_| doc.found))
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> Result<Vec<Option<Value>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(self.endpoint(&[index, "_mget"]))
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        let body: MgetResponse = Self::check(response).await?.json().await?;
        Ok(body
            .docs
            .into_iter()
            .map(|doc| doc.source.filter(|_| doc.found))
            .collect())
    }

    async fn search(&self, index: &str, query: &SearchQuery, size: usize) -> Result<SearchResults> {
        let body = Self::query_body(query, size);
        tracing::debug!(index, query = %body, "Searching");
        let response = self
            .client
            .post(self.endpoint(&[index, "_search"]))
            .json(&body)
            .send()
            .await?;
        let body: SearchResponse = Self::check(response).await?.json().await?;
        let hits: Vec<SearchHit> = body
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                score: hit
                    .score
                    .or_else(|| hit.sort.first().and_then(Value::as_f64))
                    .unwrap_or_default(),
                id: hit.id,
                source: hit.source,
            })
            .collect();
        Ok(SearchResults {
            total: body
                .hits
                .total
                .map(|t| t.value)
                .unwrap_or(hits.len() as u64),
            hits,
        })
    }

    async fn bulk_write(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }
        let response = self
            .client
            .post(self.endpoint(&["_bulk"]))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(Self::bulk_body(operations)?)
            .send()
            .await?;
        let body: BulkApiResponse = Self::check(response).await?.json().await?;

        let mut result = BulkResponse::default();
        for item in body.items.into_iter().flat_map(|item| item.into_values()) {
            match item.error {
                Some(error) => result.failures.push(BulkFailure {
                    id: item.id,
                    status: item.status,
                    error_type: error.error_type,
                    reason: error.reason,
                }),
                None => result.success += 1,
            }
        }
        if body.errors && result.failures.is_empty() {
            tracing::warn!("Bulk response flagged errors but no item carried one");
        }
        Ok(result)
    }

    async fn exists(&self, index: &str, id: &str) -> Result<bool> {
        let response = self
            .client
            .head(self.endpoint(&[index, "_doc", id]))
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Self::check(response).await.map(|_| false),
        }
    }

    async fn create_index(&self, index: &str, mapping: &Value, reset: bool) -> Result<()> {
        if reset {
            let response = self.client.delete(self.endpoint(&[index])).send().await?;
            if response.status() != StatusCode::NOT_FOUND {
                Self::check(response).await?;
                tracing::info!("Deleted index {}", index);
            }
        }
        if self.index_exists(index).await? {
            tracing::info!("Index {} already exists", index);
            return Ok(());
        }
        let response = self
            .client
            .put(self.endpoint(&[index]))
            .json(mapping)
            .send()
            .await?;
        Self::check(response).await?;
        tracing::info!("Created index {}", index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn store(server: &MockServer) -> ElasticsearchStore {
        ElasticsearchStore::new(&server.base_url()).unwrap()
    }

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let server = MockServer::start();
        let found = server.mock(|when, then| {
            when.method(GET).path("/geo_area/_doc/E09000033");
            then.status(200).json_body(json!({
                "_index": "geo_area",
                "_id": "E09000033",
                "found": true,
                "_source": {"code": "E09000033", "name": "Westminster"}
            }));
        });
        let missing = server.mock(|when, then| {
            when.method(GET).path("/geo_area/_doc/E09000099");
            then.status(404).json_body(json!({"_id": "E09000099", "found": false}));
        });

        let store = store(&server);
        let doc = store.get("geo_area", "E09000033").await.unwrap().unwrap();
        assert_eq!(doc["name"], "Westminster");
        assert!(store.get("geo_area", "E09000099").await.unwrap().is_none());
        found.assert();
        missing.assert();
    }

    #[tokio::test]
    async fn test_server_error_is_store_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/geo_area/_doc/E09000033");
            then.status(503).body("cluster unavailable");
        });
        let err = store(&server)
            .get("geo_area", "E09000033")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::StoreResponse { status: 503, ref body } if body == "cluster unavailable"));
    }

    #[tokio::test]
    async fn test_multi_get_keeps_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/geo_area/_mget")
                .json_body(json!({"ids": ["E1", "E2"]}));
            then.status(200).json_body(json!({
                "docs": [
                    {"_id": "E1", "found": false},
                    {"_id": "E2", "found": true, "_source": {"name": "Two"}}
                ]
            }));
        });
        let docs = store(&server)
            .multi_get("geo_area", &["E1".to_string(), "E2".to_string()])
            .await
            .unwrap();
        mock.assert();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].is_none());
        assert_eq!(docs[1].as_ref().unwrap()["name"], "Two");
    }

    #[tokio::test]
    async fn test_nearest_search_uses_geo_sort() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/geo_postcode/_search")
                .body_contains("_geo_distance");
            then.status(200).json_body(json!({
                "hits": {
                    "total": {"value": 1, "relation": "eq"},
                    "hits": [{
                        "_id": "SW1A 1AA",
                        "_score": null,
                        "_source": {"pcds": "SW1A 1AA"},
                        "sort": [12.5]
                    }]
                }
            }));
        });
        let results = store(&server)
            .search("geo_postcode", &SearchQuery::Nearest { lat: 51.5, lon: -0.14 }, 1)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].id, "SW1A 1AA");
        assert_eq!(results.hits[0].score, 12.5);
    }

    #[tokio::test]
    async fn test_bulk_write_sends_ndjson_and_collects_failures() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .header("content-type", "application/x-ndjson")
                .body_contains(r#""doc_as_upsert":true"#)
                .body_contains(r#""_id":"SW1A 1AA""#)
                .body_contains(r#""_index":"geo_postcode""#);
            then.status(200).json_body(json!({
                "took": 3,
                "errors": true,
                "items": [
                    {"update": {"_id": "SW1A 1AA", "status": 200}},
                    {"update": {
                        "_id": "E14000639",
                        "status": 404,
                        "error": {"type": "document_missing_exception", "reason": "document missing"}
                    }}
                ]
            }));
        });

        let ops = vec![
            BulkOperation::upsert("geo_postcode", "SW1A 1AA", json!({"pcds": "SW1A 1AA"})),
            BulkOperation::update("geo_area", "E14000639", json!({"has_boundary": true})),
        ];
        let response = store(&server).bulk_write(&ops).await.unwrap();
        mock.assert();
        assert_eq!(response.success, 1);
        assert_eq!(
            response.failures,
            vec![BulkFailure {
                id: "E14000639".into(),
                status: 404,
                error_type: "document_missing_exception".into(),
                reason: "document missing".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_bulk_write_makes_no_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.path("/_bulk");
            then.status(500);
        });
        let response = store(&server).bulk_write(&[]).await.unwrap();
        assert_eq!(response, BulkResponse::default());
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_create_index_with_reset() {
        let server = MockServer::start();
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/geo_area");
            then.status(404);
        });
        let head = server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/geo_area");
            then.status(404);
        });
        let put = server.mock(|when, then| {
            when.method(PUT).path("/geo_area").body_contains("mappings");
            then.status(200).json_body(json!({"acknowledged": true}));
        });
        store(&server)
            .create_index("geo_area", &json!({"mappings": {}}), true)
            .await
            .unwrap();
        delete.assert();
        head.assert();
        put.assert();
    }

    #[tokio::test]
    async fn test_exists() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/geo_postcode/_doc/AB101AA");
            then.status(200);
        });
        let store = store(&server);
        assert!(store.exists("geo_postcode", "AB101AA").await.unwrap());
        assert!(!store.exists("geo_postcode", "ZZ991ZZ").await.unwrap());
    }

    #[test]
    fn test_endpoint_encodes_ids() {
        let store = ElasticsearchStore::new("http://localhost:9200/").unwrap();
        assert_eq!(
            store.endpoint(&["geo_postcode", "_doc", "SW1A 1AA"]).as_str(),
            "http://localhost:9200/geo_postcode/_doc/SW1A%201AA"
        );
    }
}
