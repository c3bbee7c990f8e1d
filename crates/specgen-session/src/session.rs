//! Session context.
//!
//! [`AuthSession`] wires the store, gateway, refresh coordinator, scheduler
//! and authenticated client together. Hosts create one per signed-in
//! surface and tear it down when done.

use crate::client::{ApiRequest, AuthenticatedClient, HttpTransport, Transport};
use crate::clock::SystemClock;
use crate::error::{AuthError, AuthResult};
use crate::gateway::{AuthGateway, HttpAuthGateway, TokenGrant, TwoFactorSetup};
use crate::oauth;
use crate::refresh::RefreshCoordinator;
use crate::refresh_fsm::SchedulerState;
use crate::scheduler::RefreshScheduler;
use crate::store::{SessionState, SessionStore, SubscriptionId};
use serde::Serialize;
use serde_json::json;
use specgen_config::{Config, Paths};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Summary of the current session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub expired: bool,
    pub expires_at: Option<i64>,
    pub has_refresh_token: bool,
    pub scheduler: SchedulerState,
    pub locale: Option<String>,
}

pub struct AuthSession {
    store: Arc<SessionStore>,
    gateway: Arc<dyn AuthGateway>,
    coordinator: Arc<RefreshCoordinator>,
    scheduler: RefreshScheduler,
    client: AuthenticatedClient,
}

impl AuthSession {
    /// Assemble a session around an already loaded store.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(
        store: Arc<SessionStore>,
        gateway: Arc<dyn AuthGateway>,
        transport: Arc<dyn Transport>,
    ) -> AuthResult<Self> {
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), gateway.clone()));
        let scheduler = RefreshScheduler::start(store.clone(), coordinator.clone())?;
        let client = AuthenticatedClient::new(store.clone(), transport, coordinator.clone());

        Ok(Self {
            store,
            gateway,
            coordinator,
            scheduler,
            client,
        })
    }

    /// Open the durable session under `paths` and talk to the configured API.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        paths.ensure_dirs()?;
        let vault = specgen_storage::create_token_vault(&paths.session_file())?;
        let store = Arc::new(SessionStore::load(vault, Arc::new(SystemClock)));

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            config.api_url()?,
            config.request_timeout(),
        )?);
        let gateway: Arc<dyn AuthGateway> = Arc::new(HttpAuthGateway::new(transport.clone()));

        Self::create(store, gateway, transport)
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<()> {
        let grant = self.gateway.login(email, password).await?;
        self.store.set_tokens(&grant);
        info!("Logged in");
        Ok(())
    }

    pub async fn signup(&self, full_name: &str, email: &str, password: &str) -> AuthResult<()> {
        let grant = self.gateway.signup(full_name, email, password).await?;
        self.store.set_tokens(&grant);
        info!("Signed up");
        Ok(())
    }

    /// End the session locally.
    pub fn logout(&self) {
        self.store.clear_session();
        info!("Logged out");
    }

    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        self.gateway.request_password_reset(email).await
    }

    pub async fn request_magic_link(&self, email: &str) -> AuthResult<()> {
        self.gateway.request_magic_link(email).await
    }

    pub async fn verify_magic_link(&self, email: &str, code: &str) -> AuthResult<()> {
        let grant = self.gateway.verify_magic_link(email, code).await?;
        self.store.set_tokens(&grant);
        info!("Logged in with magic link");
        Ok(())
    }

    pub async fn complete_oauth_callback(
        &self,
        provider: &str,
        params: &BTreeMap<String, String>,
    ) -> AuthResult<()> {
        let grant = oauth::complete_callback(self.gateway.as_ref(), provider, params).await?;
        self.store.set_tokens(&grant);
        info!(provider, "Logged in with OAuth");
        Ok(())
    }

    /// Start 2FA enrollment for the signed-in user.
    pub async fn setup_two_factor(&self) -> AuthResult<TwoFactorSetup> {
        self.require_login()?;
        let request = ApiRequest::post("/auth/2fa/setup", json!({}));
        self.client.send_json(request).await
    }

    /// Confirm 2FA enrollment with an authenticator code.
    pub async fn verify_two_factor(&self, code: &str) -> AuthResult<()> {
        self.require_login()?;
        let request = ApiRequest::post("/auth/2fa/verify", json!({ "code": code }));
        self.client.send(request).await?.error_for_status()?;
        info!("Two-factor authentication verified");
        Ok(())
    }

    /// Store a grant obtained outside the gateway.
    pub fn set_tokens(&self, grant: &TokenGrant) {
        self.store.set_tokens(grant);
    }

    pub fn set_access_token(&self, token: Option<&str>) {
        self.store.set_access_token(token);
    }

    pub fn set_locale(&self, locale: Option<&str>) {
        self.store.set_locale(locale);
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.store.snapshot();
        let expired = state
            .token_expires_at
            .is_some_and(|expires_at| expires_at <= self.store.now_ms());

        SessionStatus {
            authenticated: state.is_authenticated(),
            expired,
            expires_at: state.token_expires_at,
            has_refresh_token: state.refresh_token.is_some(),
            scheduler: self.scheduler.state(),
            locale: state.locale,
        }
    }

    /// Client for authenticated API calls.
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Refresh now, joining any refresh already in flight.
    pub async fn refresh(&self) -> AuthResult<()> {
        self.coordinator.refresh().await.map(|_| ())
    }

    /// Stop the refresh timer and detach from the store. Idempotent.
    pub fn teardown(&self) {
        self.scheduler.teardown();
    }

    fn require_login(&self) -> AuthResult<()> {
        if self.store.snapshot().is_authenticated() {
            Ok(())
        } else {
            Err(AuthError::NotLoggedIn)
        }
    }
}
