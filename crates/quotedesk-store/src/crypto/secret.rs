//! The optional store secret.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, StoreError};

/// Minimum secret length in characters.
const MIN_SECRET_LENGTH: usize = 4;

/// Secret supplied to a store operation.
///
/// Save and load branch three ways on whether a secret is present and whether
/// encrypted data already exists; keeping the absence explicit lets those
/// branches be matched exhaustively.
pub enum Secret {
    /// No passphrase is available for this operation.
    NoSecret,
    /// Passphrase for encrypting or decrypting the customer payload.
    Passphrase(SecretString),
}

impl Secret {
    pub fn passphrase(value: impl Into<String>) -> Self {
        Secret::Passphrase(SecretString::from(value.into()))
    }

    /// Map a host-side `Option<String>` onto a secret.
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(value) => Secret::passphrase(value),
            None => Secret::NoSecret,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Secret::Passphrase(_))
    }

    pub fn as_secret(&self) -> Option<&SecretString> {
        match self {
            Secret::NoSecret => None,
            Secret::Passphrase(secret) => Some(secret),
        }
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        match self {
            Secret::NoSecret => Secret::NoSecret,
            Secret::Passphrase(secret) => Secret::passphrase(secret.expose_secret()),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::NoSecret => f.write_str("NoSecret"),
            Secret::Passphrase(_) => f.write_str("Passphrase([REDACTED])"),
        }
    }
}

/// Validate a new encryption secret before it is first used.
///
/// The secret must not be blank and must be at least 4 characters long.
pub fn validate_secret(secret: &str) -> Result<()> {
    if secret.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "Secret cannot be empty".to_string(),
        ));
    }

    let length = secret.chars().count();
    if length < MIN_SECRET_LENGTH {
        return Err(StoreError::InvalidInput(format!(
            "Secret must be at least {} characters (got {})",
            MIN_SECRET_LENGTH, length
        )));
    }

    Ok(())
}
