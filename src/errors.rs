use thiserror::Error;

/// Typed failure taxonomy shared by every service in the pipeline.
///
/// The classification drives retry behavior: bus workers re-deliver
/// `Transient` failures with bounded attempts and park survivors on the
/// dead-letter channel, while the other variants are terminal for the
/// delivery that produced them.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Entity absent — the handler returns without emitting downstream events.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied data violates declared ranges or enums. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network, timeout, or store contention. Re-raised so the bus retries.
    #[error("transient: {0}")]
    Transient(String),

    /// Idempotent upsert race; resolved by re-reading the existing row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unrecoverable — the process should exit non-zero.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl PipelineError {
    pub fn retryable(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }

    /// Short tag for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "not_found",
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Transient(_) => "transient",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::Fatal(_) => "fatal",
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // SQLITE_BUSY / SQLITE_LOCKED surface as retryable contention.
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                PipelineError::Transient(err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                PipelineError::Conflict(err.to_string())
            }
            other => PipelineError::Fatal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
