//! Code registers: RGC entities, CHD areas and MSOA names.

use crate::core::bulk::{BulkImporter, ImportSummary};
use crate::core::engine::{feed_rows, ImportContext, ImportJob};
use crate::core::source::{decode_text, Encoding, RowReader, SourceArchive, SourceLocation};
use crate::core::transform::{
    apply_change, apply_equivalents, area_from_change_history, entity_from_row, msoa_name_update,
};
use crate::domain::model::{AreaDocument, RawRow};
use crate::domain::ports::{BulkOperation, DocumentStore};
use crate::utils::error::{ErrorCategory, Result};
use async_trait::async_trait;
use std::collections::HashMap;

pub struct RgcImport {
    source: SourceLocation,
    index: Option<String>,
}

impl RgcImport {
    pub fn new(source: SourceLocation, index: Option<String>) -> Self {
        Self { source, index }
    }
}

#[async_trait]
impl ImportJob for RgcImport {
    fn name(&self) -> &str {
        "rgc"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.entity);
        let mut archive = SourceArchive::new(self.source.fetch(&ctx.client).await?)?;
        let members = archive.find_members("", ".csv")?;

        let mut summary = ImportSummary::default();
        for member in members {
            tracing::info!("Opening {}", member);
            let text = decode_text(&archive.read_member(&member)?, Encoding::Utf8Sig)?;
            let mut reader = RowReader::new(&text, false)?;
            let mut importer = ctx.importer();
            let outcome = feed_rows(&mut importer, &mut reader, ctx.debug_limit, |row| {
                let entity = entity_from_row(&row)?;
                let id = entity.code.clone();
                Ok(BulkOperation::upsert(index, id, serde_json::to_value(entity)?))
            })
            .await;
            summary.merge(importer.close(outcome).await?);
        }
        Ok(summary)
    }
}

/// Builds every area from `ChangeHistory`, links predecessors from `Changes`
/// and other bodies' codes from `Equivalents`, then writes them all.
pub struct ChdImport {
    source: SourceLocation,
    index: Option<String>,
}

impl ChdImport {
    pub fn new(source: SourceLocation, index: Option<String>) -> Self {
        Self { source, index }
    }
}

/// Applies `visit` to each row of `text`, counting input errors as skipped.
fn each_row<S: DocumentStore + ?Sized>(
    text: &str,
    limit: Option<usize>,
    importer: &mut BulkImporter<'_, S>,
    mut visit: impl FnMut(RawRow) -> Result<()>,
) -> Result<()> {
    let mut reader = RowReader::new(text, false)?;
    let mut line = 0usize;
    while let Some(row) = reader.next_row() {
        if limit.is_some_and(|limit| line >= limit) {
            break;
        }
        line += 1;
        match visit(row?) {
            Ok(()) => {}
            Err(e) if e.category() == ErrorCategory::Input => {
                tracing::warn!(row = line, "Skipping row: {}", e);
                importer.skip_row();
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[async_trait]
impl ImportJob for ChdImport {
    fn name(&self) -> &str {
        "chd"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.area);
        let mut archive = SourceArchive::new(self.source.fetch(&ctx.client).await?)?;
        let history = archive.find_member("changehistory", ".csv")?;
        let changes = archive.find_member("changes", ".csv")?;
        let equivalents = archive.find_member("equivalents", ".csv")?;

        let mut importer = ctx.importer();
        let mut areas: HashMap<String, AreaDocument> = HashMap::new();

        tracing::info!("Opening {}", history);
        let text = decode_text(&archive.read_member(&history)?, Encoding::Latin1)?;
        let outcome = each_row(&text, ctx.debug_limit, &mut importer, |row| {
            let area = area_from_change_history(&row)?;
            areas.insert(area.code.clone(), area);
            Ok(())
        });
        if outcome.is_err() {
            return importer.close(outcome).await;
        }
        tracing::info!("Loaded {} areas", areas.len());

        tracing::info!("Opening {}", changes);
        let text = decode_text(&archive.read_member(&changes)?, Encoding::Latin1)?;
        let outcome = each_row(&text, None, &mut importer, |row| {
            apply_change(&mut areas, &row);
            Ok(())
        });
        if outcome.is_err() {
            return importer.close(outcome).await;
        }

        tracing::info!("Opening {}", equivalents);
        let text = decode_text(&archive.read_member(&equivalents)?, Encoding::Latin1)?;
        let outcome = each_row(&text, None, &mut importer, |row| {
            apply_equivalents(&mut areas, &row);
            Ok(())
        });
        if outcome.is_err() {
            return importer.close(outcome).await;
        }

        let mut codes: Vec<String> = areas.keys().cloned().collect();
        codes.sort();
        let outcome: Result<()> = async {
            for code in codes {
                if let Some(area) = areas.remove(&code) {
                    importer
                        .add(BulkOperation::upsert(index, code, chd_area_doc(area)?))
                        .await?;
                }
            }
            Ok(())
        }
        .await;
        importer.close(outcome).await
    }
}

/// The CHD owns everything on an area except `has_boundary`, which only the
/// boundaries import sets.
fn chd_area_doc(area: AreaDocument) -> Result<serde_json::Value> {
    let mut doc = serde_json::to_value(area)?;
    if let Some(fields) = doc.as_object_mut() {
        fields.remove("has_boundary");
    }
    Ok(doc)
}

/// Friendly MSOA names applied to areas that already exist.
pub struct MsoaNamesImport {
    source: SourceLocation,
    index: Option<String>,
}

impl MsoaNamesImport {
    pub fn new(source: SourceLocation, index: Option<String>) -> Self {
        Self { source, index }
    }
}

#[async_trait]
impl ImportJob for MsoaNamesImport {
    fn name(&self) -> &str {
        "msoa-names"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.area);
        let text = decode_text(&self.source.fetch(&ctx.client).await?, Encoding::Utf8Sig)?;
        let mut reader = RowReader::new(&text, false)?;
        let mut importer = ctx.importer();
        let outcome = feed_rows(&mut importer, &mut reader, ctx.debug_limit, |row| {
            let (code, doc) = msoa_name_update(&row)?;
            Ok(BulkOperation::update(index, code, doc))
        })
        .await;
        importer.close(outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::config::settings::IndexNames;
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(dir: &TempDir, members: &[(&str, &[u8])]) -> SourceLocation {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            zip.start_file::<_, ()>(*name, FileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        let path = dir.path().join("codes.zip");
        std::fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();
        SourceLocation::File(path)
    }

    fn context(store: &InMemoryStore) -> ImportContext {
        ImportContext::new(Arc::new(store.clone()), IndexNames::from_prefix("geo"))
    }

    const CHANGE_HISTORY: &[u8] = b"GEOGCD,GEOGNM,GEOGNMW,SI_ID,SI_TITLE,OPER_DATE,TERM_DATE,PARENTCD,ENTITYCD,OWNER,STATUS,AREAEHECT,AREACHECT,AREAIHECT,AREALHECT\n\
E06000001,Hartlepool,,,,01/04/2009 00:00:00,,E12000001,E06,ONS,live,9355.9,9355.9,0,9355.9\n\
W06000001,Ynys M\xf4n,Ynys M\xf4n,,,01/04/1996 00:00:00,,W92000004,W06,WG,live,,,,\n\
E07000001,Old District,,,,01/04/1974 00:00:00,31/03/2009 00:00:00,,E07,ONS,terminated,,,,\n";

    #[tokio::test]
    async fn test_chd_links_history() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(
            &dir,
            &[
                ("ChangeHistory.csv", CHANGE_HISTORY),
                ("Changes.csv", b"GEOGCD,GEOGCD_P\nE06000001,E07000001\nE06000001,\n"),
                (
                    "Equivalents.csv",
                    b"GEOGCD,GEOGCDO,GEOGCDD,GEOGCDH,GEOGCDS,GEOGCDWG\nE06000001,00EB,,,,\n",
                ),
            ],
        );
        let store = InMemoryStore::new();
        let summary = ChdImport::new(source, None)
            .run(&context(&store))
            .await
            .unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.flushes, 1);

        let area = store.get("geo_area", "E06000001").await.unwrap().unwrap();
        assert_eq!(area["predecessor"], serde_json::json!(["E07000001"]));
        assert_eq!(area["equivalents"]["ons"], "00EB");
        assert_eq!(area["active"], true);
        let old = store.get("geo_area", "E07000001").await.unwrap().unwrap();
        assert_eq!(old["successor"], serde_json::json!(["E06000001"]));
        assert_eq!(old["active"], false);
        let welsh = store.get("geo_area", "W06000001").await.unwrap().unwrap();
        assert_eq!(welsh["name"], "Ynys Môn");
    }

    #[tokio::test]
    async fn test_chd_rerun_keeps_boundary_flag() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(
            &dir,
            &[
                ("ChangeHistory.csv", CHANGE_HISTORY),
                ("Changes.csv", b"GEOGCD,GEOGCD_P\n"),
                ("Equivalents.csv", b"GEOGCD,GEOGCDO,GEOGCDD,GEOGCDH,GEOGCDS,GEOGCDWG\n"),
            ],
        );
        let store = InMemoryStore::new();
        let job = ChdImport::new(source, None);
        job.run(&context(&store)).await.unwrap();
        let fresh = store.get("geo_area", "E06000001").await.unwrap().unwrap();
        assert!(fresh.get("has_boundary").is_none());

        store
            .bulk_write(&[BulkOperation::update(
                "geo_area",
                "E06000001",
                serde_json::json!({"has_boundary": true}),
            )])
            .await
            .unwrap();
        job.run(&context(&store)).await.unwrap();

        let area = store.get("geo_area", "E06000001").await.unwrap().unwrap();
        assert_eq!(area["has_boundary"], true);
        assert_eq!(area["name"], "Hartlepool");
    }

    #[tokio::test]
    async fn test_chd_requires_every_table() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(&dir, &[("ChangeHistory.csv", CHANGE_HISTORY)]);
        let store = InMemoryStore::new();
        assert!(ChdImport::new(source, None).run(&context(&store)).await.is_err());
        assert_eq!(store.count("geo_area").await, 0);
    }

    #[tokio::test]
    async fn test_rgc_reads_every_csv() {
        let dir = TempDir::new().unwrap();
        let header = "Entity code,Entity name,Entity abbreviation,Entity theme,Entity coverage,Related entity codes,Status,Number of live instances,Number of archived instances,Number of cross-border instances,Date of last instance change,Current code (first in range),Current code (last in range),Reserved code (for CHD use),Entity owner,Date entity introduced on RGC,Entity start date\n";
        let england = format!(
            "\u{feff}{}E06,Unitary Authorities,UA,Administrative,England,\"E07, E08\",Current,59,3,0,01/04/2023,E06000001,E06000066,E06999999,ONS,01/01/2009,01/04/1974\n",
            header
        );
        let wales = format!(
            "{}W06,Unitary Authorities,UA,Administrative,Wales,n/a,Current,22,0,0,01/04/1996,W06000001,W06000024,W06999999,WG,01/01/2009,01/04/1996\n",
            header
        );
        let source = write_zip(
            &dir,
            &[
                ("RGC_England.csv", england.as_bytes()),
                ("RGC_Wales.csv", wales.as_bytes()),
                ("readme.txt", b""),
            ],
        );
        let store = InMemoryStore::new();
        let summary = RgcImport::new(source, None)
            .run(&context(&store))
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        let entity = store.get("geo_entity", "E06").await.unwrap().unwrap();
        assert_eq!(entity["related_codes"], serde_json::json!(["E07", "E08"]));
        assert_eq!(entity["type"], "laua");
    }

    #[tokio::test]
    async fn test_msoa_names_update_existing_areas() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("msoa.csv");
        std::fs::write(
            &path,
            "\u{feff}msoa11cd,msoa11nm,msoa11hclnm,msoa11hclnmw\nE02000001,City of London 001,City of London,\nE02999999,Nowhere 001,Nowhere,\n",
        )
        .unwrap();
        let store = InMemoryStore::new();
        store
            .insert("geo_area", "E02000001", serde_json::json!({"code": "E02000001"}))
            .await;

        let summary = MsoaNamesImport::new(SourceLocation::File(path), None)
            .run(&context(&store))
            .await
            .unwrap();
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.failures.len(), 1);
        let area = store.get("geo_area", "E02000001").await.unwrap().unwrap();
        assert_eq!(area["name"], "City of London");
        assert_eq!(store.count("geo_area").await, 1);
    }
}
