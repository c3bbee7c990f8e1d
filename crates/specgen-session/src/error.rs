//! Authentication error types.

use std::sync::Arc;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Gateway response did not carry an access token
    #[error("Missing access token in gateway response")]
    MissingAccessToken,

    /// Request was rejected with HTTP 401 and could not be recovered
    #[error("Unauthorized")]
    Unauthorized,

    /// No refresh token is available to renew the session
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Outcome of a shared refresh operation. Every caller that joined the
    /// same in-flight refresh receives the same `Arc`.
    #[error("Token refresh failed: {0}")]
    Refresh(Arc<AuthError>),

    /// Gateway answered with a non-success status
    #[error("Gateway error (HTTP {status}): {message}")]
    Gateway { status: u16, message: String },

    /// OAuth provider reported a failure in the callback
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Operation requires a stored session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] specgen_storage::StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl From<specgen_config::CoreError> for AuthError {
    fn from(error: specgen_config::CoreError) -> Self {
        AuthError::Config(error.to_string())
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// The session core never retries on its own; this is for UI-level callers.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            AuthError::Gateway { status, .. } => *status >= 500,
            AuthError::Refresh(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this error means the session is gone and the user
    /// has to sign in again.
    pub fn is_session_lost(&self) -> bool {
        match self {
            AuthError::Unauthorized | AuthError::NoRefreshToken | AuthError::NotLoggedIn => true,
            AuthError::Refresh(_) => true,
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
