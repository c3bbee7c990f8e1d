//! High-level API for the persisted session entries.

use crate::{SessionStorage, StorageKeys, StorageResult};

/// Typed accessors over a [`SessionStorage`] backend.
///
/// Access token, refresh token and expiry are kept under three independent
/// keys. The expiry is stored in its decimal string form.
pub struct TokenVault {
    storage: Box<dyn SessionStorage>,
}

impl TokenVault {
    /// Create a new vault with the given storage backend
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session tokens
    // ==========================================

    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, token)
    }

    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn delete_access_token(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::ACCESS_TOKEN)
    }

    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH_TOKEN, token)
    }

    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    pub fn delete_refresh_token(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::REFRESH_TOKEN)
    }

    /// Store the access token expiry (milliseconds since epoch).
    pub fn set_token_expires_at(&self, expires_at_ms: i64) -> StorageResult<()> {
        self.storage
            .set(StorageKeys::TOKEN_EXPIRES_AT, &expires_at_ms.to_string())
    }

    /// Retrieve the access token expiry.
    ///
    /// A stored value that does not parse as an integer is treated as absent.
    pub fn get_token_expires_at(&self) -> StorageResult<Option<i64>> {
        let raw = self.storage.get(StorageKeys::TOKEN_EXPIRES_AT)?;
        Ok(raw.and_then(|value| match value.trim().parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(_) => {
                tracing::debug!("Ignoring non-numeric stored token expiry");
                None
            }
        }))
    }

    pub fn delete_token_expires_at(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::TOKEN_EXPIRES_AT)
    }

    /// Remove all three session entries.
    ///
    /// Every delete is attempted; the first failure is returned.
    pub fn clear_session(&self) -> StorageResult<()> {
        let results = [
            self.delete_access_token(),
            self.delete_refresh_token(),
            self.delete_token_expires_at(),
        ];
        for result in results {
            result?;
        }
        Ok(())
    }

    // ==========================================
    // Preferences
    // ==========================================

    pub fn set_locale(&self, locale: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::LOCALE, locale)
    }

    pub fn get_locale(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::LOCALE)
    }

    pub fn delete_locale(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::LOCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, StorageError};

    /// Backend whose deletes of one key always fail.
    struct StuckKey {
        inner: MemoryStorage,
        stuck: &'static str,
    }

    impl SessionStorage for StuckKey {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.inner.set(key, value)
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            if key == self.stuck {
                return Err(StorageError::Backend("read-only key".to_string()));
            }
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_session_entries_are_independent() {
        let storage = MemoryStorage::new();
        let vault = TokenVault::new(Box::new(storage.clone()));

        vault.set_access_token("access").unwrap();
        vault.set_refresh_token("refresh").unwrap();
        vault.set_token_expires_at(42).unwrap();
        assert_eq!(storage.len(), 3);

        vault.delete_refresh_token().unwrap();
        assert_eq!(vault.get_access_token().unwrap(), Some("access".to_string()));
        assert_eq!(vault.get_refresh_token().unwrap(), None);
        assert_eq!(
            storage.get(StorageKeys::TOKEN_EXPIRES_AT).unwrap(),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_non_numeric_expiry_reads_as_absent() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::TOKEN_EXPIRES_AT, "soon").unwrap();

        let vault = TokenVault::new(Box::new(storage));
        assert_eq!(vault.get_token_expires_at().unwrap(), None);
    }

    #[test]
    fn test_clear_session_keeps_locale() {
        let storage = MemoryStorage::new();
        let vault = TokenVault::new(Box::new(storage.clone()));

        vault.set_access_token("a").unwrap();
        vault.set_refresh_token("r").unwrap();
        vault.set_token_expires_at(1).unwrap();
        vault.set_locale("de").unwrap();

        vault.clear_session().unwrap();
        vault.clear_session().unwrap();

        assert_eq!(storage.len(), 1);
        assert_eq!(vault.get_locale().unwrap(), Some("de".to_string()));
    }

    #[test]
    fn test_clear_session_attempts_every_key() {
        let storage = MemoryStorage::new();
        let vault = TokenVault::new(Box::new(StuckKey {
            inner: storage.clone(),
            stuck: StorageKeys::ACCESS_TOKEN,
        }));

        vault.set_access_token("a").unwrap();
        vault.set_refresh_token("r").unwrap();
        vault.set_token_expires_at(1).unwrap();

        assert!(matches!(
            vault.clear_session(),
            Err(StorageError::Backend(_))
        ));
        assert_eq!(vault.get_refresh_token().unwrap(), None);
        assert_eq!(vault.get_token_expires_at().unwrap(), None);
        assert_eq!(storage.len(), 1);
    }
}
