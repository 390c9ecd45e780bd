//! Dataset import jobs, one per published release.

pub mod boundaries;
pub mod codes;
pub mod placenames;
pub mod postcodes;

use crate::core::engine::ImportJob;
use crate::core::source::SourceLocation;
use crate::utils::error::{EtlError, Result};
use std::path::PathBuf;

pub const NSPL_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/677cfc3ef56541999314efc795664ce9/data";
pub const ONSPD_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/a644dd04d18f4592b7d36705f93270d8/data";
pub const NHSPD_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/c290e7ec05d542e1a38d0822aaf3e634/data";
pub const PCON_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/0ce50b21cd5a4599b6df0452f7fed235/data";
pub const RGC_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/7216e9b54a1b49459aaaf59b3f122abc/data";
pub const CHD_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/e2b210c49bd440b89667294ffbe61fa8/data";
pub const MSOA_NAMES_URL: &str =
    "https://houseofcommonslibrary.github.io/msoanames/MSOA-Names-Latest.csv";
pub const PLACENAMES_URL: &str =
    "https://www.arcgis.com/sharing/rest/content/items/e8e725daf8944af6a336a9d183114697/data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Dataset {
    /// National Statistics Postcode Lookup
    Nspl,
    /// ONS Postcode Directory
    Onspd,
    /// NHS Postcode Directory
    Nhspd,
    /// Postcode to Westminster constituency lookup
    Pcon,
    /// Register of Geographic Codes
    Rgc,
    /// Code History Database
    Chd,
    /// House of Commons Library MSOA names
    MsoaNames,
    /// Index of Place Names
    Placenames,
    /// Area boundaries as GeoJSON
    Boundaries,
}

impl Dataset {
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            Self::Nspl => Some(NSPL_URL),
            Self::Onspd => Some(ONSPD_URL),
            Self::Nhspd => Some(NHSPD_URL),
            Self::Pcon => Some(PCON_URL),
            Self::Rgc => Some(RGC_URL),
            Self::Chd => Some(CHD_URL),
            Self::MsoaNames => Some(MSOA_NAMES_URL),
            Self::Placenames => Some(PLACENAMES_URL),
            Self::Boundaries => None,
        }
    }
}

/// Command line choices shared by every job.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub files: Vec<PathBuf>,
    pub urls: Vec<String>,
    /// Overrides the job's default index.
    pub index: Option<String>,
    pub examine: bool,
    pub code_field: Option<String>,
}

impl JobOptions {
    fn single_source(&self, dataset: Dataset) -> Result<SourceLocation> {
        if self.files.len() + self.urls.len() > 1 {
            return Err(EtlError::InvalidConfigValueError {
                field: "--file/--url".to_string(),
                value: format!("{} sources", self.files.len() + self.urls.len()),
                reason: format!("{:?} imports read a single source", dataset),
            });
        }
        SourceLocation::resolve(
            self.files.first().cloned(),
            self.urls.first().cloned(),
            dataset.default_url(),
        )
    }

    fn all_sources(&self) -> Vec<SourceLocation> {
        self.files
            .iter()
            .cloned()
            .map(SourceLocation::File)
            .chain(self.urls.iter().cloned().map(SourceLocation::Url))
            .collect()
    }
}

pub fn job_for(dataset: Dataset, options: &JobOptions) -> Result<Box<dyn ImportJob>> {
    use postcodes::{PconImport, PostcodeImport, PostcodeRelease};

    let index = options.index.clone();
    let job: Box<dyn ImportJob> = match dataset {
        Dataset::Nspl => Box::new(PostcodeImport::new(
            PostcodeRelease::Nspl,
            options.single_source(dataset)?,
            index,
        )),
        Dataset::Onspd => Box::new(PostcodeImport::new(
            PostcodeRelease::Onspd,
            options.single_source(dataset)?,
            index,
        )),
        Dataset::Nhspd => Box::new(PostcodeImport::new(
            PostcodeRelease::Nhspd,
            options.single_source(dataset)?,
            index,
        )),
        Dataset::Pcon => Box::new(PconImport::new(options.single_source(dataset)?, index)),
        Dataset::Rgc => Box::new(codes::RgcImport::new(options.single_source(dataset)?, index)),
        Dataset::Chd => Box::new(codes::ChdImport::new(options.single_source(dataset)?, index)),
        Dataset::MsoaNames => Box::new(codes::MsoaNamesImport::new(
            options.single_source(dataset)?,
            index,
        )),
        Dataset::Placenames => Box::new(placenames::PlacenamesImport::new(
            options.single_source(dataset)?,
            index,
        )),
        Dataset::Boundaries => {
            let sources = options.all_sources();
            if sources.is_empty() {
                return Err(EtlError::MissingConfigError {
                    field: "--file or --url".to_string(),
                });
            }
            Box::new(boundaries::BoundariesImport {
                sources,
                index,
                code_field: options.code_field.clone(),
                examine: options.examine,
            })
        }
    };
    Ok(job)
}
