//! Error kinds for the scoring pipeline.
//!
//! Stage code classifies failures into these kinds so the coordinator can
//! decide whether to advance a task's `last_run_at`.

use std::fmt;

/// Coarse-grained error classification used by stage code and the
/// coordinator. Wraps the underlying cause for `Display`/logging but is not
/// meant to be matched on beyond its variant (callers use `anyhow::Error`
/// for everything else).
#[derive(Debug)]
pub enum PipelineError {
    /// HTTP 5xx, timeout, or connection failure talking to an upstream.
    UpstreamTransient(anyhow::Error),
    /// Upstream responded but the shape didn't match what we expected.
    UpstreamMalformed(String),
    /// The database was unreachable or a transaction could not commit.
    StorageTransient(anyhow::Error),
    /// A natural-key constraint fired on a row we expected to be new.
    /// Treated as idempotent success by callers.
    StorageConstraint,
    /// A regressor failed to produce a component score.
    ScoringFailure { component: &'static str },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::UpstreamTransient(e) => write!(f, "upstream transient error: {e}"),
            PipelineError::UpstreamMalformed(sample) => {
                write!(f, "upstream returned malformed response: {sample}")
            }
            PipelineError::StorageTransient(e) => write!(f, "storage transient error: {e}"),
            PipelineError::StorageConstraint => {
                write!(f, "natural-key constraint on expected-new row (idempotent)")
            }
            PipelineError::ScoringFailure { component } => {
                write!(f, "scoring failed for component {component}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<PipelineError> for anyhow::Error {
    fn from(e: PipelineError) -> Self {
        anyhow::anyhow!(e)
    }
}

/// True if a rusqlite error is a UNIQUE/PRIMARY KEY constraint violation,
/// i.e. the storage-constraint kind rather than a real failure.
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}
