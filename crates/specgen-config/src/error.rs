//! Errors raised while locating, loading and saving console configuration.

use thiserror::Error;

/// Failure to set up the console's local environment.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration value is present but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing under the base directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `api_url` is not an absolute URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `config.json` could not be parsed or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No home directory to place `~/.specgen` under
    #[error("Path error: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
