//! Auth gateway.
//!
//! Remote endpoints that issue and renew tokens. Token payloads arrive in
//! either camelCase or snake_case and are normalized into a [`TokenGrant`].

use crate::client::{summarize_response_body, ApiRequest, ApiResponse, Transport};
use crate::error::{AuthError, AuthResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Normalized token response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: Option<i64>,
}

/// Token payload as sent by the gateway, in either naming convention.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenPayload {
    #[serde(default, alias = "accessToken")]
    pub access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        alias = "expiresIn",
        alias = "expires_in_seconds",
        alias = "expiresInSeconds"
    )]
    pub expires_in: Option<i64>,
}

impl TokenPayload {
    /// Validate the payload. Blank tokens count as absent.
    pub fn into_grant(self) -> AuthResult<TokenGrant> {
        let access_token = non_blank(self.access_token).ok_or(AuthError::MissingAccessToken)?;
        Ok(TokenGrant {
            access_token,
            refresh_token: non_blank(self.refresh_token),
            expires_in_seconds: self.expires_in,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Two-factor enrollment material returned by `POST /auth/2fa/setup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    #[serde(alias = "otpauthUrl", alias = "otpauth_uri", alias = "otpauthUri")]
    pub otpauth_url: String,
    #[serde(default, alias = "qrCodeDataUrl")]
    pub qr_code_data_url: Option<String>,
}

/// Remote authentication endpoints that do not need a session.
///
/// Bearer-authenticated calls such as 2FA enrollment go through
/// [`crate::AuthenticatedClient`] instead.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> AuthResult<TokenGrant>;

    async fn signup(&self, full_name: &str, email: &str, password: &str)
        -> AuthResult<TokenGrant>;

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant>;

    async fn request_password_reset(&self, email: &str) -> AuthResult<()>;

    async fn request_magic_link(&self, email: &str) -> AuthResult<()>;

    async fn verify_magic_link(&self, email: &str, code: &str) -> AuthResult<TokenGrant>;

    async fn verify_oauth_callback(
        &self,
        provider: &str,
        params: &BTreeMap<String, String>,
    ) -> AuthResult<TokenGrant>;
}

/// Gateway client speaking JSON over a [`Transport`].
#[derive(Clone)]
pub struct HttpAuthGateway {
    transport: Arc<dyn Transport>,
}

impl HttpAuthGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn call(&self, operation: &str, request: ApiRequest) -> AuthResult<ApiResponse> {
        debug!(operation, path = %request.path, "Calling auth gateway");
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            error!(
                operation,
                status = response.status,
                body_summary = %summarize_response_body(&response.body),
                "Auth gateway request failed"
            );
        }
        response.error_for_status()
    }

    async fn call_for_grant(&self, operation: &str, request: ApiRequest) -> AuthResult<TokenGrant> {
        let response = self.call(operation, request).await?;
        let payload: Option<TokenPayload> = response.json()?;
        payload.unwrap_or_default().into_grant()
    }
}

fn validate_provider(provider: &str) -> AuthResult<()> {
    let valid = !provider.is_empty()
        && provider
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AuthError::OAuth(format!("Invalid provider: {provider}")))
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, email: &str, password: &str) -> AuthResult<TokenGrant> {
        let request = ApiRequest::post(
            "/auth/login",
            json!({ "email": email, "password": password }),
        );
        self.call_for_grant("login", request).await
    }

    async fn signup(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<TokenGrant> {
        let request = ApiRequest::post(
            "/auth/signup",
            json!({ "fullName": full_name, "email": email, "password": password }),
        );
        self.call_for_grant("signup", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        let request = ApiRequest::post(
            "/auth/refresh",
            json!({ "refreshToken": refresh_token }),
        );
        self.call_for_grant("refresh", request).await
    }

    async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let request = ApiRequest::post("/auth/password/forgot", json!({ "email": email }));
        self.call("forgot_password", request).await?;
        Ok(())
    }

    async fn request_magic_link(&self, email: &str) -> AuthResult<()> {
        let request = ApiRequest::post("/auth/magic-link", json!({ "email": email }));
        self.call("magic_link", request).await?;
        Ok(())
    }

    async fn verify_magic_link(&self, email: &str, code: &str) -> AuthResult<TokenGrant> {
        let request = ApiRequest::post(
            "/auth/magic-link/verify",
            json!({ "email": email, "code": code }),
        );
        self.call_for_grant("magic_link_verify", request).await
    }

    async fn verify_oauth_callback(
        &self,
        provider: &str,
        params: &BTreeMap<String, String>,
    ) -> AuthResult<TokenGrant> {
        validate_provider(provider)?;
        let mut request = ApiRequest::get(format!("/auth/oauth/{provider}/callback"));
        for (key, value) in params {
            request = request.with_query(key.as_str(), value.as_str());
        }
        self.call_for_grant("oauth_callback", request).await
    }
}
