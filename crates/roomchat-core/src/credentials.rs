//! Credential store with first-use registration.
//!
//! The store sits behind the [`CredentialStore`] trait so the plaintext
//! in-memory implementation can be swapped for a hashed one without touching
//! the registry or the session handler.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Username was unknown; the credentials are now stored.
    Registered,
    /// Username was known and the secret matched.
    Authenticated,
    /// Username was known and the secret did not match. Nothing changed.
    Rejected,
}

impl AuthOutcome {
    /// Returns true if the connection may proceed to an active session.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Username to secret mapping with first-use registration semantics.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Authenticates `username`, registering it if it has never been seen.
    ///
    /// The check and the registration happen in one critical section, so two
    /// concurrent first attempts for the same username cannot both register.
    /// A stored secret is never overwritten by a later attempt.
    async fn authenticate(&self, username: &str, secret: &str) -> AuthOutcome;
}

/// Plaintext in-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered usernames.
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn authenticate(&self, username: &str, secret: &str) -> AuthOutcome {
        let mut users = self.users.lock().await;

        match users.get(username) {
            None => {
                users.insert(username.to_string(), secret.to_string());
                info!(user = %username, "Registered new user");
                AuthOutcome::Registered
            }
            Some(stored) if stored == secret => AuthOutcome::Authenticated,
            Some(_) => {
                debug!(user = %username, "Secret mismatch");
                AuthOutcome::Rejected
            }
        }
    }
}
