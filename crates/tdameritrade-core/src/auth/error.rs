use reqwest::StatusCode;
use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Errors surfaced by the login flow and by authenticated client construction.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("secure random source unavailable: {0}")]
    RandomnessUnavailable(#[source] rand::Error),
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("missing code in request from TD Ameritrade")]
    MissingCode,
    #[error("missing state in request from TD Ameritrade")]
    MissingState,
    #[error("invalid state. expected: '{expected}', got '{got}'")]
    InvalidState { expected: String, got: String },
    #[error("token exchange failed: {0}")]
    ExchangeFailed(#[from] ExchangeError),
    #[error("authorization flow cancelled")]
    Cancelled,
    #[error("no stored credentials; log in first")]
    NotAuthenticated,
    #[error("failed to build API client: {0}")]
    Client(#[from] ApiError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unable to listen on the redirect URI: {0}")]
    Bind(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("authorization request denied ({0})")]
    AccessDenied(String),
    #[error("failed to launch system browser: {0}")]
    BrowserLaunch(String),
    #[error("invalid authorization response: {0}")]
    InvalidAuthorizationResponse(String),
    #[error("unsupported auth flow: {0}")]
    UnsupportedFlow(&'static str),
}

/// Failures raised by [`CredentialStore`](super::CredentialStore) implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid cookie '{name}': {reason}")]
    InvalidCookie { name: String, reason: String },
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Wrap an arbitrary backend failure (database, cache, ...) without losing its type.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StorageError::Backend(err.into())
    }
}

/// Failures of the authorization-code exchange against the token endpoint.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: StatusCode, body: String },
    #[error("invalid token type '{0}'")]
    InvalidTokenType(String),
}
