// Query layer: read-only lookups over the document store.

pub mod cache;
pub mod fields;
pub mod service;

pub use cache::{AreaNameCache, SharedAreaNames};
pub use fields::{is_valid_field, FieldSet, Shape};
pub use service::{AreaResult, NearestPoint, PostcodeResult, QueryService, SearchItem, SearchOutcome};
