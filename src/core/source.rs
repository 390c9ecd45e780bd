//! Access to downloaded dataset releases: fetching, ZIP members and CSV rows.

use crate::domain::model::RawRow;
use crate::utils::error::{EtlError, Result};
use csv::{ReaderBuilder, StringRecord};
use reqwest::Client;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Url(String),
    File(PathBuf),
}

impl SourceLocation {
    /// A local file wins over a URL; `default_url` is the published release.
    pub fn resolve(
        file: Option<PathBuf>,
        url: Option<String>,
        default_url: Option<&str>,
    ) -> Result<Self> {
        match (file, url, default_url) {
            (Some(path), _, _) => Ok(Self::File(path)),
            (None, Some(url), _) => Ok(Self::Url(url)),
            (None, None, Some(url)) => Ok(Self::Url(url.to_string())),
            (None, None, None) => Err(EtlError::MissingConfigError {
                field: "--file or --url".to_string(),
            }),
        }
    }

    pub async fn fetch(&self, client: &Client) -> Result<Vec<u8>> {
        match self {
            Self::File(path) => {
                tracing::info!("Reading source file {}", path.display());
                Ok(tokio::fs::read(path).await?)
            }
            Self::Url(url) => {
                tracing::info!("Downloading {}", url);
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(EtlError::source_format(format!(
                        "Download of {} failed with status {}",
                        url, status
                    )));
                }
                let bytes = response.bytes().await?;
                tracing::debug!("Downloaded {} bytes", bytes.len());
                Ok(bytes.to_vec())
            }
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub struct SourceArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl SourceArchive {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    pub fn member_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Members whose path starts with `prefix` and ends with `suffix`, both
    /// case-insensitive, in sorted order. None found is an error.
    pub fn find_members(&self, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        let (prefix, suffix) = (prefix.to_lowercase(), suffix.to_lowercase());
        let mut found: Vec<String> = self
            .archive
            .file_names()
            .filter(|name| {
                let name = name.to_lowercase();
                name.starts_with(&prefix) && name.ends_with(&suffix)
            })
            .map(str::to_string)
            .collect();
        if found.is_empty() {
            return Err(EtlError::source_format(format!(
                "No members matching {}*{} in archive",
                prefix, suffix
            )));
        }
        found.sort();
        Ok(found)
    }

    /// The single member matching, for releases that ship one file per table.
    pub fn find_member(&self, prefix: &str, suffix: &str) -> Result<String> {
        let mut found = self.find_members(prefix, suffix)?;
        if found.len() > 1 {
            tracing::warn!(
                "{} members match {}*{}, using {}",
                found.len(),
                prefix,
                suffix,
                found[0]
            );
        }
        Ok(found.swap_remove(0))
    }

    pub fn read_member(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name)?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// UTF-8 with an optional byte order mark.
    Utf8Sig,
    Latin1,
}

pub fn decode_text(bytes: &[u8], encoding: Encoding) -> Result<String> {
    match encoding {
        Encoding::Utf8Sig => {
            let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8(body.to_vec())
                .map_err(|e| EtlError::source_format(format!("Invalid UTF-8: {}", e)))
        }
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Iterates the rows of a CSV document as header-keyed maps.
pub struct RowReader<'a> {
    reader: csv::Reader<&'a [u8]>,
    headers: StringRecord,
    record: StringRecord,
}

impl<'a> RowReader<'a> {
    /// Uses the first line as headers, lower-cased when `lowercase_headers`.
    pub fn new(text: &'a str, lowercase_headers: bool) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        let headers = reader.headers()?.clone();
        let headers = if lowercase_headers {
            headers.iter().map(|h| h.trim().to_lowercase()).collect()
        } else {
            headers.iter().map(str::trim).collect()
        };
        Ok(Self {
            reader,
            headers,
            record: StringRecord::new(),
        })
    }

    /// For header-less files with a fixed column list.
    pub fn with_fieldnames(text: &'a str, fieldnames: &[&str]) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        Self {
            reader,
            headers: fieldnames.iter().copied().collect(),
            record: StringRecord::new(),
        }
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub fn next_row(&mut self) -> Option<Result<RawRow>> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => Some(Ok(self
                .headers
                .iter()
                .zip(self.record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect())),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}
