use crate::config::settings::IndexNames;
use crate::core::bulk::{BulkImporter, ImportSummary};
use crate::core::source::RowReader;
use crate::domain::model::RawRow;
use crate::domain::ports::{BlobStore, BulkOperation, DocumentStore};
use crate::utils::error::{ErrorCategory, Result};
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;

/// Everything a dataset job needs to run.
#[derive(Clone)]
pub struct ImportContext {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Option<Arc<dyn BlobStore>>,
    pub indices: IndexNames,
    pub client: Client,
    pub batch_size: usize,
    /// Stop after this many rows per source member.
    pub debug_limit: Option<usize>,
}

impl ImportContext {
    pub fn new(store: Arc<dyn DocumentStore>, indices: IndexNames) -> Self {
        Self {
            store,
            blobs: None,
            indices,
            client: Client::new(),
            batch_size: crate::core::bulk::DEFAULT_BATCH_SIZE,
            debug_limit: None,
        }
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_debug_limit(mut self, limit: Option<usize>) -> Self {
        self.debug_limit = limit;
        self
    }

    pub fn importer(&self) -> BulkImporter<'_, dyn DocumentStore> {
        BulkImporter::new(self.store.as_ref(), self.batch_size)
    }
}

#[async_trait]
pub trait ImportJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary>;
}

/// Feed CSV rows through `to_operation` into `importer`. Rows that fail to
/// transform are logged and skipped; anything else stops the feed.
pub async fn feed_rows<S, F>(
    importer: &mut BulkImporter<'_, S>,
    reader: &mut RowReader<'_>,
    limit: Option<usize>,
    mut to_operation: F,
) -> Result<()>
where
    S: DocumentStore + ?Sized,
    F: FnMut(RawRow) -> Result<BulkOperation>,
{
    let mut line = 0usize;
    while let Some(row) = reader.next_row() {
        if limit.is_some_and(|limit| line >= limit) {
            tracing::info!("Debug limit of {} rows reached", line);
            break;
        }
        line += 1;
        match to_operation(row?) {
            Ok(operation) => importer.add(operation).await?,
            Err(e) if e.category() == ErrorCategory::Input => {
                tracing::warn!(row = line, "Skipping row: {}", e);
                importer.skip_row();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub struct ImportEngine {
    monitor: SystemMonitor,
}

impl ImportEngine {
    pub fn new() -> Self {
        Self::new_with_monitoring(false)
    }

    pub fn new_with_monitoring(monitor_enabled: bool) -> Self {
        Self {
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self, job: &dyn ImportJob, ctx: &ImportContext) -> Result<ImportSummary> {
        let started = Instant::now();
        tracing::info!(job = job.name(), "Starting import");
        self.monitor.log_stats("start");

        let result = job.run(ctx).await;

        self.monitor.log_stats("finish");
        match &result {
            Ok(summary) => tracing::info!(
                job = job.name(),
                total = summary.total,
                saved = summary.saved,
                failures = summary.failures.len(),
                skipped = summary.skipped_rows,
                elapsed = ?started.elapsed(),
                "Import complete"
            ),
            Err(e) => tracing::error!(
                job = job.name(),
                category = ?e.category(),
                severity = ?e.severity(),
                "Import failed: {}",
                e
            ),
        }
        self.monitor.log_final_stats();
        result
    }
}

impl Default for ImportEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::utils::error::EtlError;
    use serde_json::json;

    fn context(store: &InMemoryStore) -> ImportContext {
        ImportContext::new(Arc::new(store.clone()), IndexNames::from_prefix("test"))
            .with_batch_size(2)
    }

    fn code_operation(row: RawRow) -> Result<BulkOperation> {
        let code = row
            .get("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| EtlError::transform("code", "", "blank"))?;
        Ok(BulkOperation::upsert("test_area", code.clone(), json!({"code": code})))
    }

    #[tokio::test]
    async fn test_feed_rows_skips_bad_rows() {
        let store = InMemoryStore::new();
        let ctx = context(&store);
        let mut importer = ctx.importer();
        let mut reader = RowReader::new("code\nE1\n\nE2\n,\nE3\n", false).unwrap();
        let outcome = feed_rows(&mut importer, &mut reader, None, code_operation).await;
        let summary = importer.close(outcome).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(store.count("test_area").await, 3);
    }

    #[tokio::test]
    async fn test_feed_rows_honours_debug_limit() {
        let store = InMemoryStore::new();
        let ctx = context(&store);
        let mut importer = ctx.importer();
        let mut reader = RowReader::new("code\nE1\nE2\nE3\n", false).unwrap();
        let outcome = feed_rows(&mut importer, &mut reader, Some(2), code_operation).await;
        let summary = importer.close(outcome).await.unwrap();
        assert_eq!(summary.total, 2);
    }

    struct FailingJob;

    #[async_trait]
    impl ImportJob for FailingJob {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _ctx: &ImportContext) -> Result<ImportSummary> {
            Err(EtlError::source_format("no members"))
        }
    }

    #[tokio::test]
    async fn test_engine_returns_job_error() {
        let store = InMemoryStore::new();
        let err = ImportEngine::new()
            .run(&FailingJob, &context(&store))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceDataFormat { .. }));
    }
}
