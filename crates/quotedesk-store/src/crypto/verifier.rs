//! Secret hashing using Argon2id.
//!
//! The host stores the hash alongside its settings so a typed password can be
//! checked before any payload is decrypted. Hashes are PHC strings
//! (`$argon2id$v=19$m=...`), so the parameters travel with the hash.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Result, StoreError};

const ARGON2_MEMORY_KB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;

fn argon2() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(
        ARGON2_MEMORY_KB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(HASH_LENGTH),
    )
    .map_err(|e| StoreError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;

    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

fn random_salt() -> Result<SaltString> {
    let mut bytes = [0u8; SALT_LENGTH];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| StoreError::Crypto(format!("Failed to generate salt: {}", e)))?;
    SaltString::encode_b64(&bytes)
        .map_err(|e| StoreError::Crypto(format!("Failed to encode salt: {}", e)))
}

/// Hash a secret with a fresh random salt.
///
/// # Arguments
///
/// * `secret` - The secret to hash
///
/// # Returns
///
/// Returns a PHC-format hash string to store with the host's settings.
///
/// # Examples
///
/// ```
/// use quotedesk_store::crypto::{hash_secret, verify_secret};
///
/// let hash = hash_secret("correct horse").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_secret("correct horse", &hash).unwrap());
/// ```
pub fn hash_secret(secret: &str) -> Result<String> {
    if secret.is_empty() {
        return Err(StoreError::InvalidInput(
            "Secret cannot be empty".to_string(),
        ));
    }

    let salt = random_salt()?;
    let hash = argon2()?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| StoreError::Crypto(format!("Secret hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a secret against a hash produced by [`hash_secret`].
///
/// Returns `Ok(false)` for a mismatch and an error only for a malformed hash.
pub fn verify_secret(secret: &str, encoded: &str) -> Result<bool> {
    let parsed = PasswordHash::new(encoded.trim())
        .map_err(|e| StoreError::InvalidInput(format!("Invalid hash format: {}", e)))?;

    match argon2()?.verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(StoreError::Crypto(format!("Secret verification failed: {}", e))),
    }
}
