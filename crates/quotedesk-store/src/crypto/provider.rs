//! Session-scoped secret storage.
//!
//! The host collects passphrases through its own UI and parks them here for
//! the lifetime of the process. Nothing in this module touches the disk.

use std::sync::{Mutex, MutexGuard};

use secrecy::{ExposeSecret, SecretString};

use super::secret::Secret;

/// Supplies the current secret, if any, to store operations.
pub trait SecretProvider: Send + Sync {
    fn secret(&self) -> Secret;
}

/// A fixed secret is its own provider.
impl SecretProvider for Secret {
    fn secret(&self) -> Secret {
        self.clone()
    }
}

#[derive(Default)]
struct SessionState {
    encryption: Option<SecretString>,
    app: Option<SecretString>,
    use_app_secret: bool,
}

/// In-memory secrets for one application session.
///
/// Holds the dedicated encryption secret and the application login secret.
/// When `use_app_secret` is on and an application secret is set, it doubles
/// as the encryption secret.
#[derive(Default)]
pub struct SessionSecrets {
    state: Mutex<SessionState>,
}

impl SessionSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State is plain data; a panic elsewhere cannot leave it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_encryption_secret(&self, secret: Option<&str>) {
        self.lock().encryption = secret.map(|s| SecretString::from(s.to_string()));
    }

    pub fn set_app_secret(&self, secret: Option<&str>) {
        self.lock().app = secret.map(|s| SecretString::from(s.to_string()));
    }

    pub fn set_use_app_secret(&self, enabled: bool) {
        self.lock().use_app_secret = enabled;
    }

    /// Forget every secret (application shutdown or lock).
    pub fn clear(&self) {
        let mut state = self.lock();
        state.encryption = None;
        state.app = None;
    }
}

impl SecretProvider for SessionSecrets {
    fn secret(&self) -> Secret {
        let state = self.lock();
        let chosen = match (&state.app, state.use_app_secret) {
            (Some(app), true) => Some(app),
            _ => state.encryption.as_ref(),
        };
        chosen
            .map(|s| Secret::passphrase(s.expose_secret()))
            .unwrap_or(Secret::NoSecret)
    }
}
