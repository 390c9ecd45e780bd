use crate::app::jobs::{Dataset, JobOptions};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "findthatpostcode")]
#[command(about = "UK postcode, area and placename lookups: web API and data import")]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Write logs as JSON lines")]
    pub log_json: bool,

    /// TOML settings file, applied over the environment
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the web API and website
    Serve {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load a published dataset into the document store
    Import(ImportArgs),
    /// Create the indices with their mappings
    InitDb {
        /// Delete existing indices first
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    #[arg(value_enum)]
    pub dataset: Dataset,

    /// Local copy of the release; repeatable for boundaries
    #[arg(long = "file")]
    pub files: Vec<PathBuf>,

    /// Download location; repeatable for boundaries
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Write to this index instead of the dataset's default
    #[arg(long)]
    pub es_index: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after this many rows per source member
    #[arg(long)]
    pub debug_limit: Option<usize>,

    /// Describe boundary files without writing anything
    #[arg(long)]
    pub examine: bool,

    /// Property holding the area code in boundary features
    #[arg(long)]
    pub code_field: Option<String>,

    #[arg(long, help = "Log CPU and memory usage")]
    pub monitor: bool,
}

impl ImportArgs {
    /// Only a boundaries import that writes anything touches the blob store.
    pub fn needs_blob_store(&self) -> bool {
        self.dataset == Dataset::Boundaries && !self.examine
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            files: self.files.clone(),
            urls: self.urls.clone(),
            index: self.es_index.clone(),
            examine: self.examine,
            code_field: self.code_field.clone(),
        }
    }
}

impl Validate for ImportArgs {
    fn validate(&self) -> Result<()> {
        for url in &self.urls {
            validation::validate_url("url", url)?;
        }
        let files: Vec<String> = self
            .files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect();
        let allowed: &[&str] = match self.dataset {
            Dataset::Boundaries => &["geojson", "json"],
            Dataset::MsoaNames => &["csv"],
            _ => &["zip"],
        };
        validation::validate_file_extensions("file", &files, allowed)?;
        if let Some(size) = self.batch_size {
            validation::validate_positive_number("batch-size", size, 1)?;
        }
        if let Some(limit) = self.debug_limit {
            validation::validate_positive_number("debug-limit", limit, 1)?;
        }
        if let Some(index) = &self.es_index {
            validation::validate_non_empty_string("es-index", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("findthatpostcode").chain(args.iter().copied()))
            .unwrap()
    }

    fn import_args(cli: Cli) -> ImportArgs {
        match cli.command {
            Command::Import(args) => args,
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_import() {
        let cli = parse(&[
            "-v",
            "import",
            "nspl",
            "--file",
            "NSPL_FEB_2024.zip",
            "--batch-size",
            "500",
        ]);
        assert!(cli.verbose);
        let args = import_args(cli);
        assert_eq!(args.dataset, Dataset::Nspl);
        assert_eq!(args.batch_size, Some(500));
        assert!(args.validate().is_ok());
        assert_eq!(args.job_options().files.len(), 1);
    }

    #[test]
    fn test_parse_kebab_case_dataset() {
        let args = import_args(parse(&["import", "msoa-names", "--url", "https://example.com/names.csv"]));
        assert_eq!(args.dataset, Dataset::MsoaNames);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_boundaries_take_many_files() {
        let args = import_args(parse(&[
            "import",
            "boundaries",
            "--file",
            "lad.geojson",
            "--file",
            "ward.geojson",
            "--examine",
        ]));
        let options = args.job_options();
        assert_eq!(options.files.len(), 2);
        assert!(options.examine);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let args = import_args(parse(&["import", "rgc", "--file", "rgc.txt"]));
        assert!(args.validate().is_err());

        let args = import_args(parse(&["import", "chd", "--url", "ftp://example.com/chd.zip"]));
        assert!(args.validate().is_err());

        let args = import_args(parse(&["import", "nspl", "--batch-size", "0"]));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_serve_and_init_db() {
        let cli = parse(&["--log-json", "serve", "--bind", "127.0.0.1:9000"]);
        assert!(cli.log_json);
        assert!(matches!(cli.command, Command::Serve { bind: Some(ref b) } if b == "127.0.0.1:9000"));

        let cli = parse(&["init-db", "--reset"]);
        assert!(matches!(cli.command, Command::InitDb { reset: true }));
    }

    #[test]
    fn test_blob_store_only_for_boundary_writes() {
        assert!(!import_args(parse(&["import", "nspl"])).needs_blob_store());
        assert!(!import_args(parse(&["import", "chd"])).needs_blob_store());
        assert!(import_args(parse(&["import", "boundaries", "--file", "lad.geojson"])).needs_blob_store());
        assert!(!import_args(parse(&[
            "import",
            "boundaries",
            "--file",
            "lad.geojson",
            "--examine"
        ]))
        .needs_blob_store());
    }

    #[test]
    fn test_unknown_dataset() {
        assert!(Cli::try_parse_from(["findthatpostcode", "import", "gazetteer"]).is_err());
    }
}
