//! Session authentication.
//!
//! A [`Session`] holds the bearer token for one client lifetime. The token is
//! written once, by the first [`Session::authenticate`] call, and only read
//! afterwards. A failed login leaves the token empty; later stages then fail on
//! the server's rejection instead of logging in again.

use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::FleetBackend;
use crate::config::Credentials;
use crate::error::Result;

/// Authenticated session state for one Fleet server.
#[derive(Debug)]
pub struct Session {
    address: String,
    login: OnceLock<Result<String>>,
}

impl Session {
    /// Creates an unauthenticated session for the given server address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            login: OnceLock::new(),
        }
    }

    /// Creates a session that already holds a token.
    pub fn with_token(address: impl Into<String>, token: impl Into<String>) -> Self {
        let session = Self::new(address);
        let _ = session.login.set(Ok(token.into()));
        session
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Logs in and stores the token. Only the first call reaches the backend.
    pub async fn authenticate(
        &self,
        backend: &dyn FleetBackend,
        credentials: &Credentials,
    ) -> Result<()> {
        if let Some(outcome) = self.login.get() {
            debug!("Session already authenticated once, not retrying");
            return outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        }

        let outcome = backend.login(credentials).await;
        match &outcome {
            Ok(_) => info!("Authenticated to {} as {}", self.address, credentials.username),
            Err(e) => warn!("Login to {} failed: {}", self.address, e),
        }

        let stored = self.login.get_or_init(|| outcome);
        stored.as_ref().map(|_| ()).map_err(Clone::clone)
    }

    /// Returns the bearer token, or an empty string if login failed or never ran.
    pub fn token(&self) -> &str {
        match self.login.get() {
            Some(Ok(token)) => token,
            _ => "",
        }
    }

    /// Returns true once a login succeeded.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.login.get(), Some(Ok(_)))
    }
}
