//! OAuth callback completion.
//!
//! The provider redirects back with query (and sometimes fragment)
//! parameters. Those are verified through the gateway. If verification
//! fails but the redirect already carries tokens, those tokens are used.

use crate::error::{AuthError, AuthResult};
use crate::gateway::{AuthGateway, TokenGrant, TokenPayload};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

/// Collect callback parameters from a redirect URL.
///
/// Fragment parameters (implicit-grant style) are merged in; query values win
/// on conflicts.
pub fn callback_params(redirect: &Url) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    if let Some(fragment) = redirect.fragment() {
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
    }
    for (key, value) in redirect.query_pairs() {
        params.insert(key.into_owned(), value.into_owned());
    }

    params
}

/// Tokens carried directly by the callback, in camel or snake case.
pub fn direct_tokens(params: &BTreeMap<String, String>) -> Option<TokenGrant> {
    let lookup = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| params.get(*name))
            .map(|value| value.trim().to_string())
    };

    let payload = TokenPayload {
        access_token: lookup(&["access_token", "accessToken"]),
        refresh_token: lookup(&["refresh_token", "refreshToken"]),
        expires_in: lookup(&[
            "expires_in",
            "expiresIn",
            "expires_in_seconds",
            "expiresInSeconds",
        ])
        .and_then(|value| value.parse::<i64>().ok()),
    };

    payload.into_grant().ok()
}

/// Provider-reported failure (`error` / `error_description`), if any.
fn provider_error(params: &BTreeMap<String, String>) -> Option<String> {
    let error = params.get("error")?;
    Some(match params.get("error_description") {
        Some(description) => format!("{error}: {description}"),
        None => error.clone(),
    })
}

/// Verify an OAuth callback, falling back to tokens carried by the callback.
pub async fn complete_callback(
    gateway: &dyn AuthGateway,
    provider: &str,
    params: &BTreeMap<String, String>,
) -> AuthResult<TokenGrant> {
    if let Some(message) = provider_error(params) {
        warn!(provider, error = %message, "OAuth provider returned an error");
        return Err(AuthError::OAuth(message));
    }

    match gateway.verify_oauth_callback(provider, params).await {
        Ok(grant) => {
            debug!(provider, "OAuth callback verified");
            Ok(grant)
        }
        Err(e) => match direct_tokens(params) {
            Some(grant) => {
                warn!(
                    provider,
                    error = %e,
                    "OAuth verification failed; using tokens from callback"
                );
                Ok(grant)
            }
            None => Err(e),
        },
    }
}
