// Domain layer: postcode rules, documents, reference tables and ports.

pub mod areatypes;
pub mod model;
pub mod ports;
pub mod postcode;
