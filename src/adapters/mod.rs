// Adapters layer: concrete document and blob stores behind the domain ports.

pub mod blob;
pub mod elasticsearch;
pub mod memory;

pub use blob::LocalBlobStore;
#[cfg(feature = "s3")]
pub use blob::S3BlobStore;
pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryStore;
