//! Authenticated API client.
//!
//! Every outgoing request carries the current access token. A 401 triggers at
//! most one refresh and one reissue of the same request; a second 401 (or a
//! failed refresh) ends the session.

use crate::error::{AuthError, AuthResult};
use crate::store::SessionStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Short, non-reversible description of a response body for logs.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(AuthError::Config(format!("Unsupported HTTP method: {other}"))),
        }
    }
}

/// Outgoing API request, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    bearer_token: Option<String>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer_token: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Token sent in the `Authorization` header, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Whether this request has already been reissued after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    fn authorize(&mut self, token: Option<&str>) {
        self.bearer_token = token.map(str::to_string);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Fail with [`AuthError::Gateway`] unless the status is 2xx.
    pub fn error_for_status(self) -> AuthResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(AuthError::Gateway {
            status: self.status,
            message: error_message(&self.body),
        })
    }

    /// Deserialize the body. An empty body is read as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        Ok(serde_json::from_str(body)?)
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error_description", "error"] {
            if let Some(Value::String(message)) = fields.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// Sends requests over the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse>;
}

/// reqwest-backed transport rooted at a base URL.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the base URL, keeping the base path.
    pub fn endpoint(&self, path: &str) -> AuthResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let url = self.endpoint(&request.path)?;
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = request.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AuthError::Timeout
            } else if e.is_connect() {
                AuthError::NetworkUnavailable
            } else {
                AuthError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(
            method = %request.method,
            path = %request.path,
            status,
            body_summary = %summarize_response_body(&body),
            "API response received"
        );

        Ok(ApiResponse { status, body })
    }
}

/// Recovery hooks for authorization failures.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// Obtain a fresh access token after a 401.
    async fn on_unauthorized(&self) -> AuthResult<String>;

    /// The session could not be recovered.
    fn on_session_lost(&self);
}

/// API client that attaches the session's access token and recovers from a
/// single 401 per request.
#[derive(Clone)]
pub struct AuthenticatedClient {
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn UnauthorizedHandler>,
}

impl AuthenticatedClient {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn UnauthorizedHandler>,
    ) -> Self {
        Self {
            store,
            transport,
            handler,
        }
    }

    /// Send a request, refreshing and reissuing it once on 401.
    ///
    /// Non-401 responses are returned as-is whatever their status.
    pub async fn send(&self, mut request: ApiRequest) -> AuthResult<ApiResponse> {
        let access_token = self.store.snapshot().access_token;
        request.authorize(access_token.as_deref());

        loop {
            let response = self.transport.send(&request).await?;
            if !response.is_unauthorized() {
                return Ok(response);
            }

            if request.retried {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    "Request rejected again after token refresh; ending session"
                );
                self.handler.on_session_lost();
                return Err(AuthError::Unauthorized);
            }

            debug!(
                method = %request.method,
                path = %request.path,
                "Request unauthorized; refreshing access token"
            );
            let token = match self.handler.on_unauthorized().await {
                Ok(token) => token,
                Err(e) => {
                    self.handler.on_session_lost();
                    return Err(e);
                }
            };

            request.retried = true;
            request.authorize(Some(&token));
        }
    }

    /// Send a request and decode a successful JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        self.send(request).await?.error_for_status()?.json()
    }
}
