use crate::core::bulk::ImportSummary;
use crate::core::engine::{ImportContext, ImportJob};
use crate::core::source::{decode_text, Encoding, RowReader, SourceArchive, SourceLocation};
use crate::core::transform::{group_placenames, placename_from_row};
use crate::domain::ports::BulkOperation;
use crate::utils::error::{ErrorCategory, Result};
use async_trait::async_trait;

/// Index of Place Names. Rows for the same place are merged before writing,
/// so a member is read completely first.
pub struct PlacenamesImport {
    source: SourceLocation,
    index: Option<String>,
}

impl PlacenamesImport {
    pub fn new(source: SourceLocation, index: Option<String>) -> Self {
        Self { source, index }
    }
}

#[async_trait]
impl ImportJob for PlacenamesImport {
    fn name(&self) -> &str {
        "placenames"
    }

    async fn run(&self, ctx: &ImportContext) -> Result<ImportSummary> {
        let index = self.index.as_deref().unwrap_or(&ctx.indices.placename);
        let mut archive = SourceArchive::new(self.source.fetch(&ctx.client).await?)?;
        let members = archive.find_members("", ".csv")?;

        let mut summary = ImportSummary::default();
        for member in members {
            tracing::info!("Opening {}", member);
            let text = decode_text(&archive.read_member(&member)?, Encoding::Latin1)?;
            let mut importer = ctx.importer();

            let outcome: Result<()> = async {
                let mut reader = RowReader::new(&text, true)?;
                let mut places = Vec::new();
                let mut line = 0usize;
                while let Some(row) = reader.next_row() {
                    if ctx.debug_limit.is_some_and(|limit| line >= limit) {
                        break;
                    }
                    line += 1;
                    match placename_from_row(&row?) {
                        Ok(place) => places.push(place),
                        Err(e) if e.category() == ErrorCategory::Input => {
                            tracing::warn!(row = line, "Skipping row: {}", e);
                            importer.skip_row();
                        }
                        Err(e) => return Err(e),
                    }
                }

                let places = group_placenames(places);
                tracing::info!("{} rows grouped into {} places", line, places.len());
                for place in places {
                    let id = place.place18cd.clone();
                    importer
                        .add(BulkOperation::upsert(index, id, serde_json::to_value(place)?))
                        .await?;
                }
                Ok(())
            }
            .await;
            summary.merge(importer.close(outcome).await?);
        }
        Ok(summary)
    }
}
