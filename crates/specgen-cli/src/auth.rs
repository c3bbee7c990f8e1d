//! Sign-in and account commands.

use anyhow::{bail, Context};
use specgen_session::oauth::callback_params;
use specgen_session::AuthSession;
use std::collections::BTreeMap;
use url::Url;

pub async fn login(session: &AuthSession, email: &str, password: &str) -> anyhow::Result<()> {
    session
        .login(email, password)
        .await
        .context("login failed")?;
    println!("Logged in as {email}");
    Ok(())
}

pub async fn signup(
    session: &AuthSession,
    name: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    session
        .signup(name, email, password)
        .await
        .context("signup failed")?;
    println!("Account created for {email}");
    Ok(())
}

pub fn logout(session: &AuthSession) {
    session.logout();
    println!("Logged out");
}

pub fn status(session: &AuthSession) -> anyhow::Result<()> {
    let status = session.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn forgot_password(session: &AuthSession, email: &str) -> anyhow::Result<()> {
    session.request_password_reset(email).await?;
    println!("If {email} has an account, a reset link is on its way");
    Ok(())
}

pub async fn request_magic_link(session: &AuthSession, email: &str) -> anyhow::Result<()> {
    session.request_magic_link(email).await?;
    println!("Sign-in code sent to {email}");
    Ok(())
}

pub async fn verify_magic_link(
    session: &AuthSession,
    email: &str,
    code: &str,
) -> anyhow::Result<()> {
    session
        .verify_magic_link(email, code)
        .await
        .context("magic link verification failed")?;
    println!("Logged in as {email}");
    Ok(())
}

/// Collect callback parameters from redirect URLs and `key=value` pairs.
pub fn parse_callback_args(args: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for arg in args {
        if arg.contains("://") {
            let redirect = Url::parse(arg).with_context(|| format!("invalid redirect URL: {arg}"))?;
            params.extend(callback_params(&redirect));
            continue;
        }
        match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                params.insert(key.to_string(), value.to_string());
            }
            _ => bail!("expected key=value or a redirect URL, got {arg:?}"),
        }
    }
    Ok(params)
}

pub async fn oauth_callback(
    session: &AuthSession,
    provider: &str,
    args: &[String],
) -> anyhow::Result<()> {
    let params = parse_callback_args(args)?;
    session
        .complete_oauth_callback(provider, &params)
        .await
        .with_context(|| format!("{provider} sign-in failed"))?;
    println!("Logged in with {provider}");
    Ok(())
}

pub async fn two_factor_setup(session: &AuthSession) -> anyhow::Result<()> {
    let setup = session.setup_two_factor().await?;
    println!("Secret:      {}", setup.secret);
    println!("OTPAuth URL: {}", setup.otpauth_url);
    println!("Confirm with: specgen two-factor verify --code <CODE>");
    Ok(())
}

pub async fn two_factor_verify(session: &AuthSession, code: &str) -> anyhow::Result<()> {
    session
        .verify_two_factor(code)
        .await
        .context("two-factor verification failed")?;
    println!("Two-factor authentication enabled");
    Ok(())
}

pub fn set_locale(session: &AuthSession, tag: Option<&str>) {
    session.set_locale(tag);
    match tag {
        Some(tag) => println!("Locale set to {tag}"),
        None => println!("Locale cleared"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_key_value_pairs() {
        let params = parse_callback_args(&args(&["code=abc", "state=s=1"])).unwrap();
        assert_eq!(params.get("code").map(String::as_str), Some("abc"));
        assert_eq!(params.get("state").map(String::as_str), Some("s=1"));
    }

    #[test]
    fn parses_redirect_url() {
        let params = parse_callback_args(&args(&[
            "https://app.specgen.dev/auth/callback?code=abc#access_token=a1",
        ]))
        .unwrap();
        assert_eq!(params.get("code").map(String::as_str), Some("abc"));
        assert_eq!(params.get("access_token").map(String::as_str), Some("a1"));
    }

    #[test]
    fn rejects_bare_words() {
        assert!(parse_callback_args(&args(&["code"])).is_err());
        assert!(parse_callback_args(&args(&["=abc"])).is_err());
    }
}
