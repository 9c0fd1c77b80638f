//! Access-token supply for the session.
//!
//! Token acquisition and refresh happen elsewhere (the OAuth flow); the
//! session only asks a [`TokenProvider`] for the current bearer token.

use crate::error::RtmError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

/// Supplies the current access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the raw access token, without the `Bearer ` prefix.
    async fn access_token(&self) -> Result<SecretString, RtmError>;

    /// Whether a token has been obtained at all.
    fn is_authenticated(&self) -> bool;
}

/// A provider holding a single, pre-issued token.
pub struct StaticTokenProvider {
    token: Option<SecretString>,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        let token = (!token.expose_secret().is_empty()).then_some(token);
        Self { token }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<SecretString, RtmError> {
        self.token
            .clone()
            .ok_or_else(|| RtmError::Token("no access token available".to_string()))
    }

    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}
