//! Errors shared by the verifier crates
//!
//! Anything here aborts the current verification pass: the pass transaction
//! rolls back and the prediction stays eligible. Rejections of a prediction
//! are not errors; they are written as feedback rows.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Postgres connection, query or commit failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config or prompt file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing, malformed or out-of-range setting
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row the pass depends on is gone, such as the source tweet of a
    /// claimed prediction
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored column holds a value the verifier does not recognise
    /// (an unknown timeframe status or failure cause)
    #[error("Unrecognised stored value: {0}")]
    InvalidRecord(String),

    /// A terminal record would be written twice for one prediction
    #[error("Conflicting write: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failure() {
        let err = Error::InvalidRecord("Unknown failure cause: SOMETHING_NEW".into());
        assert_eq!(
            err.to_string(),
            "Unrecognised stored value: Unknown failure cause: SOMETHING_NEW"
        );

        let err = Error::Conflict("Verdict for p1 already exists".into());
        assert_eq!(err.to_string(), "Conflicting write: Verdict for p1 already exists");
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "prompts/filter.md");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
