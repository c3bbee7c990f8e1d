#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use specgen_session::{
    ApiRequest, ApiResponse, AuthError, AuthGateway, AuthResult, AuthSession, ManualClock,
    SessionStore, TokenGrant, Transport,
};
use specgen_storage::{MemoryStorage, TokenVault};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// Fixed start time for every test clock (2023-11-14T22:13:20Z).
pub const T0: i64 = 1_700_000_000_000;

pub fn grant(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in_seconds: expires_in,
    }
}

/// Gateway with scripted refresh outcomes and an optional gate that holds
/// refresh calls until released.
#[derive(Default)]
pub struct ScriptedGateway {
    refresh_script: Mutex<VecDeque<AuthResult<TokenGrant>>>,
    refresh_calls: Mutex<Vec<String>>,
    login_result: Mutex<Option<AuthResult<TokenGrant>>>,
    oauth_result: Mutex<Option<AuthResult<TokenGrant>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_refresh(&self, result: AuthResult<TokenGrant>) {
        self.refresh_script.lock().push_back(result);
    }

    pub fn set_login(&self, result: AuthResult<TokenGrant>) {
        *self.login_result.lock() = Some(result);
    }

    pub fn set_oauth(&self, result: AuthResult<TokenGrant>) {
        *self.oauth_result.lock() = Some(result);
    }

    /// Hold refresh calls until the returned notify is signalled.
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Refresh tokens received, in call order.
    pub fn refresh_calls(&self) -> Vec<String> {
        self.refresh_calls.lock().clone()
    }
}

#[async_trait]
impl AuthGateway for ScriptedGateway {
    async fn login(&self, _email: &str, _password: &str) -> AuthResult<TokenGrant> {
        self.login_result
            .lock()
            .take()
            .unwrap_or(Err(AuthError::Unauthorized))
    }

    async fn signup(&self, _: &str, _: &str, _: &str) -> AuthResult<TokenGrant> {
        Err(AuthError::Config("signup not scripted".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        self.refresh_calls.lock().push(refresh_token.to_string());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.refresh_script
            .lock()
            .pop_front()
            .unwrap_or(Err(AuthError::NetworkUnavailable))
    }

    async fn request_password_reset(&self, _: &str) -> AuthResult<()> {
        Ok(())
    }

    async fn request_magic_link(&self, _: &str) -> AuthResult<()> {
        Ok(())
    }

    async fn verify_magic_link(&self, _: &str, code: &str) -> AuthResult<TokenGrant> {
        if code == "123456" {
            Ok(grant("a-magic", Some("r-magic"), Some(900)))
        } else {
            Err(AuthError::Gateway {
                status: 400,
                message: "invalid code".to_string(),
            })
        }
    }

    async fn verify_oauth_callback(
        &self,
        _: &str,
        _: &BTreeMap<String, String>,
    ) -> AuthResult<TokenGrant> {
        self.oauth_result
            .lock()
            .take()
            .unwrap_or(Err(AuthError::NetworkUnavailable))
    }
}

type Responder = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct ScriptedTransport {
    responder: Responder,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Accept only the given bearer token.
    pub fn accepting(token: &'static str) -> Arc<Self> {
        Self::new(move |request| match request.bearer_token() {
            Some(bearer) if bearer == token => ApiResponse::new(200, r#"{"ok":true}"#),
            _ => ApiResponse::new(401, r#"{"error":"unauthorized"}"#),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.bearer_token().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        self.requests.lock().push(request.clone());
        Ok((self.responder)(request))
    }
}

/// A fully wired session over in-memory storage and a manual clock.
pub struct Harness {
    pub storage: MemoryStorage,
    pub clock: Arc<ManualClock>,
    pub store: Arc<SessionStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub transport: Arc<ScriptedTransport>,
    pub session: AuthSession,
}

impl Harness {
    /// Must be called inside a Tokio runtime.
    pub fn new(transport: Arc<ScriptedTransport>) -> Self {
        Self::with_storage(MemoryStorage::new(), transport)
    }

    pub fn with_storage(storage: MemoryStorage, transport: Arc<ScriptedTransport>) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let vault = TokenVault::new(Box::new(storage.clone()));
        let store = Arc::new(SessionStore::load(vault, clock.clone()));
        let gateway = ScriptedGateway::new();
        let session = AuthSession::create(store.clone(), gateway.clone(), transport.clone())
            .expect("session should start inside a runtime");

        Self {
            storage,
            clock,
            store,
            gateway,
            transport,
            session,
        }
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
