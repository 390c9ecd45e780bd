use crate::domain::ports::{BulkFailure, BulkOperation, DocumentStore};
use crate::utils::error::Result;
use serde::Serialize;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Outcome of one import run. `failures` are per-document rejections the
/// store reported; they never abort the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub saved: usize,
    pub flushes: usize,
    pub skipped_rows: usize,
    pub failures: Vec<BulkFailure>,
}

impl ImportSummary {
    pub fn merge(&mut self, other: ImportSummary) {
        self.total += other.total;
        self.saved += other.saved;
        self.flushes += other.flushes;
        self.skipped_rows += other.skipped_rows;
        self.failures.extend(other.failures);
    }
}

/// Buffers bulk operations and writes them to the store in batches of
/// `limit`. Call [`BulkImporter::close`] to write the tail of the batch.
pub struct BulkImporter<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    limit: usize,
    pending: Vec<BulkOperation>,
    total: usize,
    saved: usize,
    flushes: usize,
    skipped_rows: usize,
    failures: Vec<BulkFailure>,
}

impl<'a, S: DocumentStore + ?Sized> BulkImporter<'a, S> {
    pub fn new(store: &'a S, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            store,
            limit,
            pending: Vec::with_capacity(limit.min(DEFAULT_BATCH_SIZE)),
            total: 0,
            saved: 0,
            flushes: 0,
            skipped_rows: 0,
            failures: Vec::new(),
        }
    }

    pub async fn add(&mut self, operation: BulkOperation) -> Result<()> {
        self.pending.push(operation);
        self.total += 1;
        if self.pending.len() >= self.limit {
            self.flush().await?;
        }
        Ok(())
    }

    /// Count a source row that could not be turned into an operation.
    pub fn skip_row(&mut self) {
        self.skipped_rows += 1;
    }

    /// Write the pending batch. The batch is cleared even when the store
    /// call fails.
    pub async fn flush(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        let response = self.store.bulk_write(&batch).await?;
        self.flushes += 1;
        self.saved += response.success;
        for failure in &response.failures {
            tracing::warn!(
                id = %failure.id,
                status = failure.status,
                error_type = %failure.error_type,
                "Document rejected: {}",
                failure.reason
            );
        }
        self.failures.extend(response.failures);
        tracing::info!(
            processed = self.total,
            pending = self.pending.len(),
            saved = self.saved,
            errors = self.failures.len(),
            "Flushed batch of {} documents",
            batch.len()
        );
        Ok(())
    }

    /// Run the final flush and finish the run. `outcome` is the result of
    /// the loop that fed the importer; its error wins over a flush error.
    pub async fn close(mut self, outcome: Result<()>) -> Result<ImportSummary> {
        let flushed = self.flush().await;
        match (outcome, flushed) {
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(flush_err)) => {
                tracing::error!("Final flush failed after aborted import: {}", flush_err);
                Err(e)
            }
            (Ok(()), Err(flush_err)) => Err(flush_err),
            (Ok(()), Ok(())) => Ok(self.summary()),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn failures(&self) -> &[BulkFailure] {
        &self.failures
    }

    fn summary(&mut self) -> ImportSummary {
        ImportSummary {
            total: self.total,
            saved: self.saved,
            flushes: self.flushes,
            skipped_rows: self.skipped_rows,
            failures: std::mem::take(&mut self.failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{BulkResponse, SearchQuery, SearchResults};
    use crate::utils::error::EtlError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Records batch sizes; rejects ids starting with "bad" and fails the
    /// whole call once `fail_on_call` is reached.
    #[derive(Clone, Default)]
    struct RecordingStore {
        batches: Arc<Mutex<Vec<usize>>>,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn get(&self, _index: &str, _id: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn multi_get(&self, _index: &str, ids: &[String]) -> Result<Vec<Option<Value>>> {
            Ok(vec![None; ids.len()])
        }

        async fn search(
            &self,
            _index: &str,
            _query: &SearchQuery,
            _size: usize,
        ) -> Result<SearchResults> {
            Ok(SearchResults::default())
        }

        async fn bulk_write(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
            let mut batches = self.batches.lock().await;
            if self.fail_on_call == Some(batches.len()) {
                batches.push(operations.len());
                return Err(EtlError::StoreResponse {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            batches.push(operations.len());
            let failures: Vec<BulkFailure> = operations
                .iter()
                .filter(|op| op.id.starts_with("bad"))
                .map(|op| BulkFailure {
                    id: op.id.clone(),
                    status: 400,
                    error_type: "mapper_parsing_exception".into(),
                    reason: "failed to parse".into(),
                })
                .collect();
            Ok(BulkResponse {
                success: operations.len() - failures.len(),
                failures,
            })
        }

        async fn exists(&self, _index: &str, _id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn create_index(&self, _index: &str, _mapping: &Value, _reset: bool) -> Result<()> {
            Ok(())
        }
    }

    fn op(id: &str) -> BulkOperation {
        BulkOperation::upsert("geo_postcode", id, json!({"pcds": id}))
    }

    #[tokio::test]
    async fn test_flushes_at_threshold_and_once_on_close() {
        let store = RecordingStore::default();
        let mut importer = BulkImporter::new(&store, 3);
        for i in 0..7 {
            importer.add(op(&format!("pc{}", i))).await.unwrap();
        }
        assert_eq!(importer.flushes(), 2);
        assert_eq!(importer.len(), 1);

        let summary = importer.close(Ok(())).await.unwrap();
        assert_eq!(summary.flushes, 3);
        assert_eq!(summary.total, 7);
        assert_eq!(summary.saved, 7);
        assert_eq!(*store.batches.lock().await, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_close_flushes_even_when_batch_is_empty() {
        let store = RecordingStore::default();
        let mut importer = BulkImporter::new(&store, 2);
        importer.add(op("a")).await.unwrap();
        importer.add(op("b")).await.unwrap();
        let summary = importer.close(Ok(())).await.unwrap();
        assert_eq!(summary.flushes, 2);
        assert_eq!(*store.batches.lock().await, vec![2, 0]);
    }

    #[tokio::test]
    async fn test_failures_accumulate_and_batch_clears() {
        let store = RecordingStore::default();
        let mut importer = BulkImporter::new(&store, 2);
        for id in ["ok1", "bad1", "ok2", "bad2", "bad3"] {
            importer.add(op(id)).await.unwrap();
        }
        assert_eq!(importer.failures().len(), 2);
        assert!(importer.len() == 1);

        let summary = importer.close(Ok(())).await.unwrap();
        assert_eq!(summary.saved, 2);
        let ids: Vec<&str> = summary.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["bad1", "bad2", "bad3"]);
    }

    #[tokio::test]
    async fn test_store_error_propagates_and_clears_batch() {
        let store = RecordingStore {
            fail_on_call: Some(0),
            ..Default::default()
        };
        let mut importer = BulkImporter::new(&store, 2);
        importer.add(op("a")).await.unwrap();
        let err = importer.add(op("b")).await.unwrap_err();
        assert!(matches!(err, EtlError::StoreResponse { status: 503, .. }));
        assert!(importer.is_empty());
    }

    #[tokio::test]
    async fn test_close_flushes_and_reports_caller_error() {
        let store = RecordingStore::default();
        let mut importer = BulkImporter::new(&store, 10);
        importer.add(op("a")).await.unwrap();
        let outcome = Err(EtlError::source_format("truncated archive"));
        let err = importer.close(outcome).await.unwrap_err();
        assert!(matches!(err, EtlError::SourceDataFormat { .. }));
        assert_eq!(*store.batches.lock().await, vec![1]);
    }

    #[tokio::test]
    async fn test_skipped_rows_are_counted() {
        let store = RecordingStore::default();
        let mut importer = BulkImporter::new(&store, 10);
        importer.skip_row();
        importer.add(op("a")).await.unwrap();
        importer.skip_row();
        let summary = importer.close(Ok(())).await.unwrap();
        assert_eq!(summary.skipped_rows, 2);
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let store = RecordingStore::default();
        let importer = BulkImporter::new(&store, 0);
        assert_eq!(importer.limit, 1);
    }
}
