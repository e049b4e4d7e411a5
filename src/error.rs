use crate::data::{ClassId, JobId, SchoolId};
use thiserror::Error;

/// Errors surfaced to callers. Hard schedule conflicts are deliberately not
/// here: they ride inside the generation result, and only infrastructure
/// failures (bad input, unreachable store, failed persistence) become errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown class {0} for this school")]
    UnknownClass(ClassId),
    #[error("school {0} has no classes in the requested scope")]
    EmptyScope(SchoolId),
    #[error("data access failed: {0}")]
    DataAccess(#[from] rusqlite::Error),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("unknown job {0}")]
    JobNotFound(JobId),
}
