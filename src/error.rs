// src/error.rs

use thiserror::Error;

/// Failures surfaced by the progression engine and its collaborators.
#[derive(Debug, Error)]
pub enum TutorError {
    /// A user, chapter, topic or progress record that registration should
    /// have created does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A remote store call failed or timed out. Safe to retry.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// The caller submitted something malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stored document did not have the expected shape.
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

impl TutorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TutorError::TransientIo(_))
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(e: serde_json::Error) -> Self {
        TutorError::Corrupt(e.to_string())
    }
}

impl From<rusqlite::Error> for TutorError {
    fn from(e: rusqlite::Error) -> Self {
        TutorError::TransientIo(format!("sqlite: {}", e))
    }
}

impl From<tokio::task::JoinError> for TutorError {
    fn from(e: tokio::task::JoinError) -> Self {
        TutorError::TransientIo(format!("background task failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(TutorError::TransientIo("timeout".into()).is_retryable());
        assert!(!TutorError::NotFound("users/u1".into()).is_retryable());
        assert!(!TutorError::Validation("empty".into()).is_retryable());
        assert!(!TutorError::Corrupt("bad".into()).is_retryable());
    }

    #[test]
    fn serde_failures_map_to_corrupt() {
        let err: TutorError = serde_json::from_str::<u8>("\"x\"").unwrap_err().into();
        assert!(matches!(err, TutorError::Corrupt(_)));
    }
}
