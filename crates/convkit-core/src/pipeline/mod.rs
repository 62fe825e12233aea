//! The fetch, sweep and convert pipeline.
//!
//! [`ConversionOrchestrator`] drives a run over the catalog. Every decision
//! is based on what is on disk, so running again is always safe and is the
//! only retry mechanism.

mod fetch;
mod orchestrator;
mod types;

pub use fetch::{ensure_fetched, WeightsSource};
pub use orchestrator::{catalog_status, ConversionOrchestrator};
pub use types::{
    ConversionOutcome, FetchOutcome, FetchReport, ModelReport, ModelStatus, RunSummary,
    StageError, StageStatus,
};
