//! Durable key-value storage for the SpecGen session core.
//!
//! This crate provides:
//! - The [`SessionStorage`] trait, a string-keyed durable store
//! - [`MemoryStorage`], an in-process backend for tests and ephemeral sessions
//! - [`FileStorage`], a JSON-file backend that survives restarts
//! - [`TokenVault`], typed accessors for the session keys

mod file;
mod keys;
mod memory;
mod tokens;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use tokens::TokenVault;
pub use traits::SessionStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the default durable storage at `path`.
pub fn create_storage(path: &Path) -> StorageResult<Box<dyn SessionStorage>> {
    let storage = FileStorage::open(path)?;
    Ok(Box::new(storage))
}

/// Create a [`TokenVault`] over the default durable storage at `path`.
pub fn create_token_vault(path: &Path) -> StorageResult<TokenVault> {
    let storage = create_storage(path)?;
    Ok(TokenVault::new(storage))
}
