//! Engine-level error taxonomy.

use crate::store::StoreError;
use crewrun_core::{GraphError, JobStatus};
use thiserror::Error;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The crew definition does not form a valid task graph.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A status transition outside the sanctioned table was attempted.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// No job with the given id is registered with the engine.
    #[error("job not found")]
    JobNotFound,

    /// The operation requires a running job.
    #[error("job is not running (status: {0})")]
    NotRunning(JobStatus),

    /// Retry is only available from the error state.
    #[error("job is not retryable (status: {0})")]
    NotRetryable(JobStatus),
}
