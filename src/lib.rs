pub mod adapters;
pub mod api;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod query;
pub mod utils;

pub use crate::adapters::{ElasticsearchStore, InMemoryStore, LocalBlobStore};
pub use crate::api::{build_router, AppState};
pub use crate::app::jobs::{job_for, Dataset, JobOptions};
pub use crate::config::{IndexNames, Settings};
pub use crate::core::{ImportContext, ImportEngine, ImportSummary};
pub use crate::query::{AreaNameCache, FieldSet, QueryService};
pub use crate::utils::error::{EtlError, Result};
