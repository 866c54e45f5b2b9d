//! Engine error model.

use thiserror::Error;

/// Result type used across the engine layer.
pub type EngineResult<T> = Result<T, EngineError>;

/// Operation-level failure of the transition engine.
///
/// Per-serial rejections are *not* errors of this kind: they travel in the
/// batch outcome so that one ineligible serial never aborts its siblings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or out-of-range input, caught before any state is touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A status precondition was not met (e.g. withdrawal not PENDING).
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The addressed withdrawal does not exist.
    #[error("not found")]
    NotFound,

    /// The delete cascade could not complete; nothing was removed.
    #[error("not deletable: {0}")]
    NotDeletable(String),

    /// The backing store failed mid-operation; the cascade was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn not_deletable(msg: impl Into<String>) -> Self {
        Self::NotDeletable(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}
