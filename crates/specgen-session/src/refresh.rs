//! Token refresh coordination.
//!
//! Proactive (scheduler) and reactive (401) refreshes both go through
//! [`RefreshCoordinator::refresh`], so they share a single in-flight call.

use crate::client::UnauthorizedHandler;
use crate::error::{AuthError, AuthResult};
use crate::gateway::{AuthGateway, TokenGrant};
use crate::single_flight::{RefreshOutcome, RefreshSlot};
use crate::store::SessionStore;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RefreshCoordinator {
    store: Arc<SessionStore>,
    gateway: Arc<dyn AuthGateway>,
    slot: RefreshSlot,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn AuthGateway>) -> Self {
        Self {
            store,
            gateway,
            slot: RefreshSlot::new(),
        }
    }

    /// Refresh the access token, joining any refresh already in flight.
    ///
    /// On failure the session has been cleared by the time this returns.
    pub async fn refresh(&self) -> AuthResult<String> {
        let (pending, started) = self.slot.join_or_start(|| self.start_refresh());
        if !started {
            debug!("Joining in-flight token refresh");
        }
        pending.await.map_err(AuthError::Refresh)
    }

    pub fn is_refreshing(&self) -> bool {
        self.slot.is_pending()
    }

    fn start_refresh(&self) -> BoxFuture<'static, RefreshOutcome> {
        let store = self.store.clone();
        let gateway = self.gateway.clone();

        async move {
            let Some(refresh_token) = store.snapshot().refresh_token else {
                warn!("No refresh token available; clearing session");
                store.clear_session();
                return Err(Arc::new(AuthError::NoRefreshToken));
            };

            match gateway.refresh(&refresh_token).await {
                Ok(grant) => {
                    let grant = TokenGrant {
                        refresh_token: grant.refresh_token.or(Some(refresh_token)),
                        ..grant
                    };
                    store.set_tokens(&grant);
                    info!(
                        expires_in_seconds = ?grant.expires_in_seconds,
                        "Access token refreshed"
                    );
                    Ok(grant.access_token)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed; clearing session");
                    store.clear_session();
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl UnauthorizedHandler for RefreshCoordinator {
    async fn on_unauthorized(&self) -> AuthResult<String> {
        if self.store.snapshot().refresh_token.is_none() {
            warn!("Unauthorized without a refresh token; clearing session");
            self.store.clear_session();
            return Err(AuthError::NoRefreshToken);
        }
        self.refresh().await
    }

    fn on_session_lost(&self) {
        self.store.clear_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use specgen_storage::{MemoryStorage, TokenVault};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Gateway whose refresh blocks until released.
    struct GatedGateway {
        calls: AtomicUsize,
        release: Notify,
        result: fn() -> AuthResult<TokenGrant>,
    }

    #[async_trait]
    impl AuthGateway for GatedGateway {
        async fn login(&self, _: &str, _: &str) -> AuthResult<TokenGrant> {
            unreachable!()
        }
        async fn signup(&self, _: &str, _: &str, _: &str) -> AuthResult<TokenGrant> {
            unreachable!()
        }
        async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            (self.result)()
        }
        async fn request_password_reset(&self, _: &str) -> AuthResult<()> {
            unreachable!()
        }
        async fn request_magic_link(&self, _: &str) -> AuthResult<()> {
            unreachable!()
        }
        async fn verify_magic_link(&self, _: &str, _: &str) -> AuthResult<TokenGrant> {
            unreachable!()
        }
        async fn verify_oauth_callback(
            &self,
            _: &str,
            _: &BTreeMap<String, String>,
        ) -> AuthResult<TokenGrant> {
            unreachable!()
        }
    }

    fn fixture(result: fn() -> AuthResult<TokenGrant>) -> (Arc<SessionStore>, Arc<GatedGateway>) {
        let vault = TokenVault::new(Box::new(MemoryStorage::new()));
        let store = Arc::new(SessionStore::load(vault, Arc::new(ManualClock::new(0))));
        let gateway = Arc::new(GatedGateway {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
            result,
        });
        (store, gateway)
    }

    fn seed(store: &SessionStore) {
        store.set_tokens(&TokenGrant {
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_in_seconds: None,
        });
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_make_one_call() {
        let (store, gateway) = fixture(|| {
            Ok(TokenGrant {
                access_token: "a2".to_string(),
                refresh_token: None,
                expires_in_seconds: Some(600),
            })
        });
        seed(&store);
        let coordinator = RefreshCoordinator::new(store.clone(), gateway.clone());

        let first = coordinator.refresh();
        let second = coordinator.refresh();
        let release = async {
            tokio::task::yield_now().await;
            gateway.release.notify_one();
        };
        let (a, b, ()) = tokio::join!(first, second, release);

        assert_eq!(a.unwrap(), "a2");
        assert_eq!(b.unwrap(), "a2");
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());

        // Refresh token kept when the gateway does not rotate it.
        let state = store.snapshot();
        assert_eq!(state.access_token.as_deref(), Some("a2"));
        assert_eq!(state.refresh_token.as_deref(), Some("r1"));
        assert_eq!(state.token_expires_at, Some(600_000));
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_session() {
        let (store, gateway) = fixture(|| Err(AuthError::MissingAccessToken));
        seed(&store);
        let coordinator = RefreshCoordinator::new(store.clone(), gateway.clone());

        gateway.release.notify_one();
        let result = coordinator.refresh().await;

        match result {
            Err(AuthError::Refresh(inner)) => {
                assert!(matches!(*inner, AuthError::MissingAccessToken))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.snapshot().access_token, None);
        assert_eq!(store.snapshot().refresh_token, None);
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_token_skips_gateway() {
        let (store, gateway) = fixture(|| Err(AuthError::Timeout));
        store.set_access_token(Some("a1"));
        let coordinator = RefreshCoordinator::new(store.clone(), gateway.clone());

        let result = coordinator.on_unauthorized().await;

        assert!(matches!(result, Err(AuthError::NoRefreshToken)));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(!store.snapshot().is_authenticated());
    }
}
