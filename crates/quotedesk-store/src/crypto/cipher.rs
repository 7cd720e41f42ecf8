//! Payload encryption capability.
//!
//! The store treats encryption as an opaque capability: bytes plus a secret
//! in, printable string out, and back. `AgeCipher` is the production
//! implementation; the ciphertext is base64-armored so it can live inside a
//! JSON document.

use std::io::{Read, Write};
use std::iter;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, StoreError};

/// Opaque encrypt/decrypt capability.
///
/// Implementations must fail `decrypt` with `StoreError::DecryptionFailed`
/// for a wrong secret or a damaged payload, never return garbage.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8], secret: &SecretString) -> Result<String>;

    fn decrypt(&self, payload: &str, secret: &SecretString) -> Result<Vec<u8>>;
}

/// Age passphrase-based encryption (scrypt KDF), base64-armored.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeCipher;

impl Cipher for AgeCipher {
    fn encrypt(&self, plaintext: &[u8], secret: &SecretString) -> Result<String> {
        let encryptor = age::Encryptor::with_user_passphrase(SecretString::from(
            secret.expose_secret().to_string(),
        ));

        let mut encrypted = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| StoreError::Crypto(format!("Failed to create encryptor: {}", e)))?;

        writer
            .write_all(plaintext)
            .map_err(|e| StoreError::Crypto(format!("Encryption write failed: {}", e)))?;

        writer
            .finish()
            .map_err(|e| StoreError::Crypto(format!("Encryption finish failed: {}", e)))?;

        Ok(STANDARD.encode(encrypted))
    }

    fn decrypt(&self, payload: &str, secret: &SecretString) -> Result<Vec<u8>> {
        let encrypted = STANDARD
            .decode(payload.trim().as_bytes())
            .map_err(|e| StoreError::DecryptionFailed(format!("Payload is not base64: {}", e)))?;

        let decryptor = age::Decryptor::new(encrypted.as_slice()).map_err(|e| {
            StoreError::DecryptionFailed(format!("Payload is not an age file: {}", e))
        })?;

        let identity =
            age::scrypt::Identity::new(SecretString::from(secret.expose_secret().to_string()));
        let mut reader = decryptor
            .decrypt(iter::once(&identity as &dyn age::Identity))
            .map_err(|e| match e {
                age::DecryptError::NoMatchingKeys
                | age::DecryptError::DecryptionFailed
                | age::DecryptError::KeyDecryptionFailed => {
                    StoreError::DecryptionFailed("Incorrect secret".to_string())
                }
                _ => StoreError::DecryptionFailed(e.to_string()),
            })?;

        let mut decrypted = Vec::new();
        reader.read_to_end(&mut decrypted).map_err(|e| {
            StoreError::DecryptionFailed(format!("Failed to read decrypted data: {}", e))
        })?;

        Ok(decrypted)
    }
}
