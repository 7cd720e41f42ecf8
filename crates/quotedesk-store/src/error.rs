//! Error types for the customer record store.
//!
//! Errors are classified so the host application can react to each one
//! differently: a wrong password re-prompts, a missing store means "nothing
//! persisted yet", and I/O failures on save warn the user that data was not
//! written. Safety interlocks (refused writes, incomplete wipes) are not
//! errors; they are reported through `SaveOutcome` and `WipeReport`.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Core error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing document file does not exist
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// Wrong secret or corrupted encrypted payload
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Encrypted data exists and the operation needs the secret
    #[error("Secret required: {0}")]
    SecretRequired(String),

    /// Persisted data is structurally inconsistent
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// Record validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Encryption or hashing error
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True for failures that mean "the user typed the wrong password".
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, StoreError::DecryptionFailed(_))
    }

    /// True for failures of the underlying filesystem, which ordinary loads
    /// degrade to "nothing persisted yet".
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StoreError::DecryptionFailed("bad".into()).is_decryption_failure());
        assert!(!StoreError::SecretRequired("x".into()).is_decryption_failure());

        let io = StoreError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(io.is_io());
        assert!(!StoreError::StoreNotFound("customers.json".into()).is_io());
    }

    #[test]
    fn test_messages() {
        let err = StoreError::StoreNotFound("customers.json".to_string());
        assert_eq!(err.to_string(), "Store not found: customers.json");
    }
}
