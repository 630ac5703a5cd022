//! Session-scoped token cache.
//!
//! After a successful join the token is cached so the presentation layer can
//! prefill it on re-entry. The cache is a convenience only and is never
//! consulted to authorize anything.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Key for the primary stage token.
pub const STAGE_TOKEN_KEY: &str = "stage-token";

/// Key for the screenshare stage token.
pub const SCREENSHARE_TOKEN_KEY: &str = "stage-screenshare-token";

/// Key/value store scoped to the user's session.
pub trait TokenStorage: Send + Sync {
    fn load(&self, key: &str) -> Option<SecretString>;
    fn store(&self, key: &str, token: SecretString);
}

/// In-memory [`TokenStorage`]; lives as long as the client.
#[derive(Default)]
pub struct SessionStorage {
    entries: Mutex<HashMap<String, SecretString>>,
}

impl SessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for SessionStorage {
    fn load(&self, key: &str) -> Option<SecretString> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .map(|token| SecretString::from(token.expose_secret().to_owned()))
    }

    fn store(&self, key: &str, token: SecretString) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), token);
    }
}
