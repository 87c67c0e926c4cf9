//! Geopolitical risk scoring pipeline library.
//!
//! Exposes the stage modules for use by the `georisk` binary and by the
//! integration tests under `tests/`.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod features;
pub mod ingest;
pub mod models;
pub mod nlp;
pub mod register;
pub mod scoring;
pub mod storage;

pub use config::Config;
pub use coordinator::{Coordinator, TaskName};
pub use error::PipelineError;
pub use storage::Storage;
