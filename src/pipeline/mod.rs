//! Run pipeline: fetch, normalize, deduplicate, enrich, persist, encode.

pub mod codec;
pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod report;
pub mod storage;

pub use orchestrator::{Orchestrator, RunOutput, RunPaths};
pub use report::{RunReport, Stage};
