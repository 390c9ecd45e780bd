pub mod bulk;
pub mod engine;
pub mod source;
pub mod transform;

pub use bulk::{BulkImporter, ImportSummary};
pub use engine::{ImportContext, ImportEngine, ImportJob};
