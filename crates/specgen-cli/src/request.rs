//! Authenticated API requests.

use anyhow::{bail, Context};
use specgen_session::{ApiRequest, AuthSession, HttpMethod};

fn build_request(
    method: &str,
    path: &str,
    body: Option<&str>,
    query: &[String],
) -> anyhow::Result<ApiRequest> {
    let method: HttpMethod = method.parse()?;
    let mut request = ApiRequest::new(method, path);

    if let Some(body) = body {
        let body = serde_json::from_str(body).context("request body is not valid JSON")?;
        request = request.with_body(body);
    }
    for pair in query {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("query parameter must be key=value, got {pair:?}");
        };
        request = request.with_query(key, value);
    }

    Ok(request)
}

pub async fn send(
    session: &AuthSession,
    method: &str,
    path: &str,
    body: Option<&str>,
    query: &[String],
) -> anyhow::Result<()> {
    let request = build_request(method, path, body, query)?;
    let response = session.client().send(request).await?;

    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !response.body.is_empty() => println!("{}", response.body),
        Err(_) => {}
    }

    if !response.is_success() {
        bail!("request failed with HTTP {}", response.status);
    }
    Ok(())
}
