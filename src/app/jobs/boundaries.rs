//! Area boundaries from GeoJSON feature collections.
//!
//! Each feature is written to the blob store under its area code and the
//! matching area document is flagged with `has_boundary`.

use crate::adapters::blob::boundary_key;
use crate::core::bulk::ImportSummary;
use crate::core::engine::{ImportContext, ImportJob};
use crate::core::source::SourceLocation;
use crate::core::transform::find_code_field;
use crate::domain::ports::{BlobStore, BulkOperation};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

const EXAMINE_FEATURES: usize = 5;

pub struct BoundariesImport {
    pub sources: Vec<SourceLocation>,
    pub index: Option<String>,
    /// Property holding the area code; discovered from the first feature
    /// when not given.
    pub code_field: Option<String>,
    /// Report on the files without writing anything.
    pub examine: bool,
}

fn features(collection: &Value) -> &[Value] {
    collection
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn properties(feature: &Value) -> Option<&serde_json::Map<String, Value>> {
    feature.get("properties").and_then(Value::as_object)
}

fn feature_code(feature: &Value, code_field: &str) -> Option<String> {
    match properties(feature)?.get(code_field)? {
        Value::String(code) if !code.trim().is_empty() => Some(code.trim().to_string()),
        _ => None,
    }
}

impl BoundariesImport {
    fn resolve_code_field(&self, source: &SourceLocation, features: &[Value]) -> Result<String> {
        if let Some(field) = &self.code_field {
            return Ok(field.clone());
        }
        let first = features.first().ok_or_else(|| {
            EtlError::source_format(format!("Features not found in {}", source))
        })?;
        let empty = serde_json::Map::new();
        find_code_field(properties(first).unwrap_or(&empty))
    }

    fn examine_source(&self, source: &SourceLocation, collection: &Value) {
        let features = features(collection);
        let code_field = match self.resolve_code_field(source, features) {
            Ok(field) => field,
            Err(e) => {
                tracing::error!(source = %source, "{}", e);
                return;
            }
        };
        let geojson_type = collection
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(
            source = %source,
            code_field = %code_field,
            geojson_type,
            features = features.len(),
            "Examined boundary file"
        );
        for (i, feature) in features.iter().take(EXAMINE_FEATURES).enumerate() {
            let keys: Vec<&str> = properties(feature)
                .map(|p| p.keys().map(String::as_str).collect())
                .unwrap_or_default();
            let geometry_type = feature
                .pointer("/geometry/type")
                .and_then(Value::as_str)
                .unwrap_or("none");
            match feature_code(feature, &code_field) {
                Some(code) => tracing::info!(
                    feature = i,
                    properties = ?keys,
                    geometry_type,
                    code = %code,
                    "Feature"
                ),
                None => tracing::error!(
                    feature = i,
                    properties = ?keys,
                    geometry_type,
                    "Feature has no {} code",
                    code_field
                ),
            }
        }
    }

    async fn import_source(
        &self,
        ctx: &ImportContext,
        blobs: &dyn BlobStore,
        source: &SourceLocation,
        collection: &Value,
    ) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.area);
        let features = features(collection);
        let code_field = self.resolve_code_field(source, features)?;
        tracing::info!(
            source = %source,
            code_field = %code_field,
            "{} features to import",
            features.len()
        );

        let mut importer = ctx.importer();
        let outcome: Result<()> = async {
            for (i, feature) in features.iter().enumerate() {
                if ctx.debug_limit.is_some_and(|limit| i >= limit) {
                    break;
                }
                let Some(code) = feature_code(feature, &code_field) else {
                    tracing::warn!(feature = i, "Skipping feature without {}", code_field);
                    importer.skip_row();
                    continue;
                };
                blobs
                    .upload(&boundary_key(&code), &serde_json::to_vec(feature)?)
                    .await?;
                importer
                    .add(BulkOperation::update(index, code, json!({ "has_boundary": true })))
                    .await?;
            }
            Ok(())
        }
        .await;
        importer.close(outcome).await
    }
}

#[async_trait]
impl ImportJob for BoundariesImport {
    fn name(&self) -> &str {
        "boundaries"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let blobs = match (&ctx.blobs, self.examine) {
            (Some(blobs), _) => Some(blobs.as_ref()),
            (None, true) => None,
            (None, false) => {
                return Err(EtlError::MissingConfigError {
                    field: "blob store".to_string(),
                })
            }
        };

        let mut summary = ImportSummary::default();
        for source in &self.sources {
            let collection: Value = serde_json::from_slice(&source.fetch(&ctx.client).await?)?;
            match blobs {
                Some(blobs) if !self.examine => {
                    summary.merge(self.import_source(ctx, blobs, source, &collection).await?)
                }
                _ => self.examine_source(source, &collection),
            }
        }
        Ok(summary)
    }
}
