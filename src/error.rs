//! Errors that abort a run.
//!
//! Row-level problems never surface here: they are counted in the run
//! report. Anything in [`PipelineError`] means no output should be written.

use thiserror::Error;

use crate::models::Dataset;
use crate::pip::ReferenceSystemError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required field '{field}' not found in {dataset} (available: {})", .available.join(", "))]
    Schema {
        dataset: Dataset,
        field: String,
        available: Vec<String>,
    },

    #[error("no usable rows left in {dataset} ({dropped} of {read} rows dropped)")]
    EmptyInput {
        dataset: Dataset,
        read: usize,
        dropped: usize,
    },

    #[error(transparent)]
    ReferenceSystem(#[from] ReferenceSystemError),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
