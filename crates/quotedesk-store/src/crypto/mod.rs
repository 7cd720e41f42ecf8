//! Cryptographic capabilities consumed by the store.
//!
//! - **Secret**: the optional passphrase threaded through save/load as an
//!   explicit sum type instead of a nullable string
//! - **SecretProvider**: where the host keeps the passphrase for a session
//! - **Cipher**: opaque `encrypt`/`decrypt` capability; the default
//!   implementation is Age passphrase encryption (scrypt KDF)
//! - **verifier**: Argon2id password hashes for checking a passphrase
//!   before attempting a decryption
//!
//! ## Security Model
//!
//! - Secrets live only in memory and are never written or logged
//! - Wrong secrets surface as `DecryptionFailed`, never as empty data

pub mod cipher;
pub mod provider;
pub mod secret;
pub mod verifier;

pub use cipher::{AgeCipher, Cipher};
pub use provider::{SecretProvider, SessionSecrets};
pub use secret::{validate_secret, Secret};
pub use verifier::{hash_secret, verify_secret};
