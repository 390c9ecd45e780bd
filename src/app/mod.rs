// Application layer: dataset import jobs and index definitions.

pub mod indices;
pub mod jobs;
