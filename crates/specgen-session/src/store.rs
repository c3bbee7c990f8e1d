//! Session state store.
//!
//! Single source of truth for the access token, refresh token, token expiry
//! and locale. Every mutation is written to durable storage first, then to
//! the in-memory snapshot, then broadcast to subscribers in subscription
//! order. Storage failures are logged and never surface to callers.

use crate::clock::Clock;
use crate::gateway::TokenGrant;
use parking_lot::Mutex;
use serde::Serialize;
use specgen_storage::{StorageResult, TokenVault};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifetime assumed when the gateway does not report one.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 1800;

/// Lower bound applied to any reported lifetime.
pub const MIN_EXPIRES_IN_SECS: i64 = 60;

/// Compute the absolute expiry for a freshly issued access token.
pub fn derive_expires_at(now_ms: i64, expires_in_seconds: Option<i64>) -> i64 {
    let lifetime = expires_in_seconds
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
        .max(MIN_EXPIRES_IN_SECS);
    now_ms.saturating_add(lifetime.saturating_mul(1000))
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub locale: Option<String>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Subscriber callback, invoked synchronously after every mutation.
pub type SessionCallback = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Handle returned by [`SessionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct SessionStore {
    vault: TokenVault,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<(SubscriptionId, SessionCallback)>>,
    next_subscription: AtomicU64,
}

impl SessionStore {
    /// Hydrate the store from durable storage.
    ///
    /// A refresh token or expiry without an access token is an orphan left
    /// behind by an interrupted write; it is discarded on load.
    pub fn load(vault: TokenVault, clock: Arc<dyn Clock>) -> Self {
        let access_token = read_or_absent("access token", vault.get_access_token());
        let mut refresh_token = read_or_absent("refresh token", vault.get_refresh_token());
        let mut token_expires_at =
            read_or_absent("token expiry", vault.get_token_expires_at());
        let locale = read_or_absent("locale", vault.get_locale());

        if access_token.is_none() && (refresh_token.is_some() || token_expires_at.is_some()) {
            debug!("Discarding orphaned refresh token and expiry");
            log_failure("delete refresh token", vault.delete_refresh_token());
            log_failure("delete token expiry", vault.delete_token_expires_at());
            refresh_token = None;
            token_expires_at = None;
        }

        let state = SessionState {
            access_token,
            refresh_token,
            token_expires_at,
            locale,
        };
        debug!(authenticated = state.is_authenticated(), "Session store loaded");

        Self {
            vault,
            clock,
            state: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Current wall-clock time in milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Store a grant from the gateway, replacing the current tokens.
    ///
    /// A grant without a refresh token removes any stored refresh token.
    pub fn set_tokens(&self, grant: &TokenGrant) {
        let expires_at = derive_expires_at(self.now_ms(), grant.expires_in_seconds);

        let snapshot = {
            let mut state = self.state.lock();

            log_failure(
                "write access token",
                self.vault.set_access_token(&grant.access_token),
            );
            match &grant.refresh_token {
                Some(refresh_token) => log_failure(
                    "write refresh token",
                    self.vault.set_refresh_token(refresh_token),
                ),
                None => log_failure("delete refresh token", self.vault.delete_refresh_token()),
            }
            log_failure(
                "write token expiry",
                self.vault.set_token_expires_at(expires_at),
            );

            state.access_token = Some(grant.access_token.clone());
            state.refresh_token = grant.refresh_token.clone();
            state.token_expires_at = Some(expires_at);
            state.clone()
        };

        debug!(
            expires_at,
            has_refresh_token = snapshot.refresh_token.is_some(),
            "Session tokens updated"
        );
        self.notify(&snapshot);
    }

    /// Replace only the access token. `None` ends the session.
    ///
    /// A new token is given the default lifetime so that the expiry always
    /// describes the token that is actually stored.
    pub fn set_access_token(&self, token: Option<&str>) {
        let Some(token) = token else {
            self.clear_session();
            return;
        };

        let expires_at = derive_expires_at(self.now_ms(), None);
        let snapshot = {
            let mut state = self.state.lock();
            log_failure("write access token", self.vault.set_access_token(token));
            log_failure(
                "write token expiry",
                self.vault.set_token_expires_at(expires_at),
            );
            state.access_token = Some(token.to_string());
            state.token_expires_at = Some(expires_at);
            state.clone()
        };

        debug!(expires_at, "Access token replaced");
        self.notify(&snapshot);
    }

    /// Remove all tokens. The locale survives.
    pub fn clear_session(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            log_failure("clear session", self.vault.clear_session());
            state.access_token = None;
            state.refresh_token = None;
            state.token_expires_at = None;
            state.clone()
        };

        debug!("Session cleared");
        self.notify(&snapshot);
    }

    /// Set or remove the locale.
    pub fn set_locale(&self, locale: Option<&str>) {
        let snapshot = {
            let mut state = self.state.lock();
            match locale {
                Some(locale) => log_failure("write locale", self.vault.set_locale(locale)),
                None => log_failure("delete locale", self.vault.delete_locale()),
            }
            state.locale = locale.map(str::to_string);
            state.clone()
        };

        self.notify(&snapshot);
    }

    /// Register a callback for every subsequent mutation.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn notify(&self, snapshot: &SessionState) {
        // Callbacks may subscribe or unsubscribe, so iterate a copy.
        let subscribers: Vec<SessionCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in subscribers {
            callback(snapshot);
        }
    }
}

fn read_or_absent<T>(what: &str, result: StorageResult<Option<T>>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to read {what} from storage; treating as absent");
            None
        }
    }
}

fn log_failure<T>(operation: &str, result: StorageResult<T>) {
    if let Err(e) = result {
        warn!(error = %e, operation, "Session storage write failed");
    }
}
