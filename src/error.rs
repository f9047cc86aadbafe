//! Error types for the dispatch service.

use crate::dispatch::job::{JobId, JobStatus};
use crate::dispatch::technician::TechnicianId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Classification oracle errors. Never surfaced as dispatch failures;
/// the dispatcher recovers from all of them with a fallback classification.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Invalid oracle response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Oracle confidence {confidence:.2} below threshold {threshold:.2}")]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scheduler errors: job lifecycle, technician availability, queue state.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid classification: {reason}")]
    InvalidClassification { reason: String },

    #[error("Job {id} is {from}, cannot transition to {to}")]
    IllegalTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Technician {id} is unavailable (holding {current_job:?})")]
    TechnicianUnavailable {
        id: TechnicianId,
        current_job: Option<JobId>,
    },

    #[error("Technician {id} has no active job")]
    NoActiveJob { id: TechnicianId },

    #[error("Priority queue is empty")]
    Empty,

    #[error("Job {id} not found")]
    JobNotFound { id: JobId },

    #[error("Technician {id} not found")]
    TechnicianNotFound { id: TechnicianId },

    #[error("Dispatch invariant violated: {0}")]
    InvariantViolation(String),
}

/// Result type alias for the dispatch service.
pub type Result<T> = std::result::Result<T, Error>;
