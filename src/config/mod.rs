#[cfg(feature = "cli")]
pub mod cli;
pub mod settings;

#[cfg(feature = "cli")]
pub use cli::{Cli, Command, ImportArgs};
pub use settings::{BlobBackend, BlobSettings, IndexNames, Settings};
