//! Error types for swarm-verifier
//!
//! Only transient failures are errors here. A prediction rejected at some stage
//! is a normal pass outcome (see [`crate::workflow::PassOutcome`]) and never
//! surfaces as a `VerifierError`.

use thiserror::Error;

use crate::reasoning::ReasoningError;

/// Failure that aborts the current transaction and triggers worker backoff
#[derive(Debug, Error)]
pub enum VerifierError {
    /// Store or infrastructure failure
    #[error(transparent)]
    Common(#[from] swarm_common::Error),

    /// Reasoning service transport failure or malformed response
    #[error("Reasoning service error: {0}")]
    Reasoning(#[from] ReasoningError),
}

impl From<sqlx::Error> for VerifierError {
    fn from(err: sqlx::Error) -> Self {
        VerifierError::Common(swarm_common::Error::Database(err))
    }
}

/// Result type for pipeline operations
pub type VerifierResult<T> = Result<T, VerifierError>;
