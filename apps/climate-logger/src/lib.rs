pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod range;
pub mod series;
pub mod store;
pub mod validate;
