//! Postcode directory imports (NSPL, ONSPD, NHSPD) and the constituency lookup.

use crate::core::bulk::ImportSummary;
use crate::core::engine::{feed_rows, ImportContext, ImportJob};
use crate::core::source::{decode_text, Encoding, RowReader, SourceArchive, SourceLocation};
use crate::core::transform::{pcon_update_from_row, postcode_from_row};
use crate::domain::ports::BulkOperation;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;

/// NHSPD ships its CSV without a header row.
pub const NHSPD_FIELDNAMES: &[&str] = &[
    "pcd2", "pcds", "dointr", "doterm", "oseast100m", "osnrth100m", "oscty", "odslaua",
    "oslaua", "osward", "usertype", "osgrdind", "ctry", "oshlthau", "rgn", "oldha", "nhser",
    "sicbl", "psed", "cened", "edind", "ward98", "oa01", "nhsrlo", "hro", "lsoa01", "ur01ind",
    "msoa01", "cannet", "scn", "oshaprev", "oldpct", "oldhro", "pcon", "canreg", "pct",
    "oseast1m", "osnrth1m", "oa11", "lsoa11", "msoa11", "calncv", "icb", "smhpc_aed",
    "smhpc_as", "smhpc_ct4", "oa21", "lsoa21", "msoa21",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostcodeRelease {
    Nspl,
    Onspd,
    Nhspd,
}

impl PostcodeRelease {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nspl => "nspl",
            Self::Onspd => "onspd",
            Self::Nhspd => "nhspd",
        }
    }

    /// Path prefix of the data members inside the release archive.
    pub fn member_prefix(&self) -> &'static str {
        match self {
            Self::Nspl => "Data/multi_csv/NSPL",
            Self::Onspd => "Data/multi_csv/ONSPD",
            Self::Nhspd => "Data/",
        }
    }

    fn reader<'a>(&self, text: &'a str) -> Result<RowReader<'a>> {
        match self {
            Self::Nhspd => Ok(RowReader::with_fieldnames(text, NHSPD_FIELDNAMES)),
            _ => RowReader::new(text, true),
        }
    }
}

pub struct PostcodeImport {
    release: PostcodeRelease,
    source: SourceLocation,
    index: Option<String>,
}

impl PostcodeImport {
    pub fn new(release: PostcodeRelease, source: SourceLocation, index: Option<String>) -> Self {
        Self {
            release,
            source,
            index,
        }
    }
}

#[async_trait]
impl ImportJob for PostcodeImport {
    fn name(&self) -> &str {
        self.release.name()
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.postcode);
        let mut archive = SourceArchive::new(self.source.fetch(&ctx.client).await?)?;
        let members = archive.find_members(self.release.member_prefix(), ".csv")?;

        let mut summary = ImportSummary::default();
        for member in members {
            tracing::info!(release = self.release.name(), "Opening {}", member);
            let text = decode_text(&archive.read_member(&member)?, Encoding::Utf8Sig)?;
            let mut reader = self.release.reader(&text)?;
            let mut importer = ctx.importer();
            let outcome = feed_rows(&mut importer, &mut reader, ctx.debug_limit, |row| {
                let doc = postcode_from_row(&row)?;
                let id = doc.id().to_string();
                Ok(BulkOperation::upsert(index, id, serde_json::to_value(doc)?))
            })
            .await;
            summary.merge(importer.close(outcome).await?);
        }
        Ok(summary)
    }
}

/// Adds the Westminster constituency code to existing postcodes.
pub struct PconImport {
    source: SourceLocation,
    index: Option<String>,
}

impl PconImport {
    pub const MEMBER_PREFIX: &'static str = "pcd_pcon_";

    pub fn new(source: SourceLocation, index: Option<String>) -> Self {
        Self { source, index }
    }
}

#[async_trait]
impl ImportJob for PconImport {
    fn name(&self) -> &str {
        "pcon"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.postcode);
        let mut archive = SourceArchive::new(self.source.fetch(&ctx.client).await?)?;
        let members = archive.find_members(Self::MEMBER_PREFIX, ".csv")?;

        let mut summary = ImportSummary::default();
        for member in members {
            tracing::info!("Opening {}", member);
            let text = decode_text(&archive.read_member(&member)?, Encoding::Utf8Sig)?;
            let mut reader = RowReader::new(&text, true)?;
            if !reader.headers().iter().any(|h| h == "pconcd") {
                return Err(EtlError::source_format(format!(
                    "{} has no pconcd column",
                    member
                )));
            }
            let mut importer = ctx.importer();
            let outcome = feed_rows(&mut importer, &mut reader, ctx.debug_limit, |row| {
                let (postcode, doc) = pcon_update_from_row(&row)?;
                Ok(BulkOperation::upsert(index, postcode.as_str(), doc))
            })
            .await;
            summary.merge(importer.close(outcome).await?);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::config::settings::IndexNames;
    use crate::domain::ports::DocumentStore;
    use std::io::{Cursor, Write};
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(dir: &TempDir, members: &[(&str, &str)]) -> SourceLocation {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in members {
            zip.start_file::<_, ()>(*name, FileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        let path = dir.path().join("release.zip");
        std::fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();
        SourceLocation::File(path)
    }

    fn context(store: &InMemoryStore) -> ImportContext {
        ImportContext::new(Arc::new(store.clone()), IndexNames::from_prefix("geo"))
            .with_batch_size(2)
    }

    #[tokio::test]
    async fn test_nspl_imports_every_member() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(
            &dir,
            &[
                (
                    "Data/multi_csv/NSPL_NOV_2024_UK_AB.csv",
                    "pcds,dointr,doterm,laua,lat,long\nAB1 0AA,198001,199606,S12000033,57.101474,-2.242851\nAB1 0AB,198001,,S12000033,57.102554,-2.246308\n",
                ),
                (
                    "Data/multi_csv/NSPL_NOV_2024_UK_SW.csv",
                    "pcds,dointr,doterm,laua,lat,long\nSW1A 1AA,198001,,E09000033,51.501009,-0.141588\nnot a postcode,198001,,,,\n",
                ),
                ("Documents/readme.txt", "ignore me"),
            ],
        );
        let store = InMemoryStore::new();
        let job = PostcodeImport::new(PostcodeRelease::Nspl, source, None);
        let summary = job.run(&context(&store)).await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.skipped_rows, 1);
        assert_eq!(store.count("geo_postcode").await, 3);
        let doc = store.get("geo_postcode", "SW1A 1AA").await.unwrap().unwrap();
        assert_eq!(doc["laua"], "E09000033");
        assert_eq!(doc["postcode_district"], "SW1A");
    }

    #[tokio::test]
    async fn test_nhspd_uses_fixed_fieldnames() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(
            &dir,
            &[("Data/nhg24nov.csv", "AB1 0AA,AB1 0AA,198001,199606\n")],
        );
        let store = InMemoryStore::new();
        let job = PostcodeImport::new(PostcodeRelease::Nhspd, source, None);
        let summary = job.run(&context(&store)).await.unwrap();
        assert_eq!(summary.total, 1);
        let doc = store.get("geo_postcode", "AB1 0AA").await.unwrap().unwrap();
        assert_eq!(doc["doterm"], "1996-06-01");
    }

    #[tokio::test]
    async fn test_missing_members_fail() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(&dir, &[("Data/other.txt", "")]);
        let store = InMemoryStore::new();
        let job = PostcodeImport::new(PostcodeRelease::Onspd, source, None);
        assert!(matches!(
            job.run(&context(&store)).await,
            Err(EtlError::SourceDataFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_pcon_adds_constituency() {
        let dir = TempDir::new().unwrap();
        let source = write_zip(
            &dir,
            &[("pcd_pcon_uk_lu_may_24.csv", "pcd,pconcd\nSW1A 1AA,E14001172\n")],
        );
        let store = InMemoryStore::new();
        store
            .insert("geo_postcode", "SW1A 1AA", serde_json::json!({"pcds": "SW1A 1AA", "laua": "E09000033"}))
            .await;
        PconImport::new(source, None)
            .run(&context(&store))
            .await
            .unwrap();
        let doc = store.get("geo_postcode", "SW1A 1AA").await.unwrap().unwrap();
        assert_eq!(doc["pcon"], "E14001172");
        assert_eq!(doc["laua"], "E09000033");
    }
}
