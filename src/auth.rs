//! Credential collaborator contract.
//!
//! The client never stores or refreshes tokens itself; it reads one from an
//! injected [`TokenProvider`] each time a connection attempt starts. A `None`
//! token makes `connect()` fail fatally — the caller must re-authenticate
//! and connect again explicitly.

use std::sync::{Arc, Mutex};

/// Supplies the auth token used to open a connection.
///
/// `token()` is synchronous and called on every connection attempt,
/// including automatic reconnects, so a provider backed by a refreshing
/// session store picks up rotated tokens on the next attempt.
pub trait TokenProvider: Send + Sync {
    /// Current auth token, or `None` if the session is unauthenticated.
    fn token(&self) -> Option<String>;
}

/// A fixed-token provider for tests and simple callers.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Arc<Mutex<Option<String>>>,
}

impl StaticTokenProvider {
    /// Create a provider that always yields `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(Mutex::new(Some(token.into()))),
        }
    }

    /// Create a provider with no token (unauthenticated).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the stored token. Takes effect on the next connection attempt.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
