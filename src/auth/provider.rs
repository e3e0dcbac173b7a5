//! Identity provider client: authorization URL, code exchange and profile fetch.

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{ACCEPT, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::state::AuthConfig;
use crate::APP_USER_AGENT;

/// Profile data read from the provider, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteIdentity {
    #[serde(rename = "id")]
    pub provider_user_id: i64,
    pub login: String,
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Provider access token. Only ever used for the profile request.
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        self.0.expose_secret()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} returned HTTP {status}")]
    Status {
        operation: &'static str,
        status: u16,
    },
    #[error("provider rejected the authorization code: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Trade an authorization code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ProviderError>;

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteIdentity, ProviderError>;
}

/// Build the provider authorization URL the browser is redirected to.
#[must_use]
pub fn authorization_url(config: &AuthConfig, state: &str) -> Url {
    let mut url = config.auth_url().clone();
    url.query_pairs_mut()
        .append_pair("client_id", config.client_id())
        .append_pair("redirect_uri", config.callback_url().as_str())
        .append_pair("scope", &config.scopes().join(" "))
        .append_pair("state", state);
    url
}

#[derive(Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// GitHub answers token errors with HTTP 200 and an `error` field.
#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub struct GitHubClient {
    client_id: String,
    client_secret: SecretString,
    callback_url: Url,
    token_url: Url,
    user_url: Url,
    http: Client,
}

impl GitHubClient {
    /// Build a client whose requests are all bounded by the configured timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.provider_timeout())
            .build()?;
        Ok(Self {
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().clone(),
            callback_url: config.callback_url().clone(),
            token_url: config.token_url().clone(),
            user_url: config.user_url().clone(),
            http,
        })
    }
}

#[async_trait]
impl ProviderClient for GitHubClient {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ProviderError> {
        let request = TokenExchangeRequest {
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            code,
            redirect_uri: self.callback_url.as_str(),
        };

        debug!("exchanging authorization code");

        let response = self
            .http
            .post(self.token_url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "token exchange failed");
            return Err(ProviderError::Status {
                operation: "token exchange",
                status: status.as_u16(),
            });
        }

        let payload: TokenExchangeResponse = response.json().await?;
        if let Some(error) = payload.error {
            let description = payload.error_description.unwrap_or_default();
            warn!(error = %error, description = %description, "provider rejected code");
            return Err(ProviderError::Rejected(error));
        }
        payload
            .access_token
            .filter(|token| !token.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| ProviderError::Rejected("missing access_token".to_string()))
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<RemoteIdentity, ProviderError> {
        let response = self
            .http
            .get(self.user_url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "profile request failed");
            return Err(ProviderError::Status {
                operation: "profile request",
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        Form, Json, Router,
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        if form.get("client_secret").map(String::as_str) != Some("client-secret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response();
        }
        match form.get("code").map(String::as_str) {
            Some("valid") => Json(json!({
                "access_token": "gho_valid",
                "token_type": "bearer",
                "scope": "read:user",
            }))
            .into_response(),
            Some("slow") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "access_token": "late" })).into_response()
            }
            Some("broken") => StatusCode::BAD_GATEWAY.into_response(),
            _ => Json(json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired.",
            }))
            .into_response(),
        }
    }

    async fn user_endpoint(headers: HeaderMap) -> impl IntoResponse {
        let authorized = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some("Bearer gho_valid");
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({
            "id": 1001,
            "login": "alice",
            "name": "Alice",
            "avatar_url": "https://avatars.example.test/alice",
        }))
        .into_response()
    }

    /// Serve a fake provider on an ephemeral port and return a matching config.
    async fn fake_provider() -> Result<AuthConfig> {
        let app = Router::new()
            .route("/login/oauth/access_token", post(token_endpoint))
            .route("/user", get(user_endpoint));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let base = format!("http://{addr}");
        Ok(AuthConfig::new(
            "client-id".to_string(),
            SecretString::from("client-secret"),
            SecretString::from("signing-key"),
            Url::parse("http://127.0.0.1:8080/oauth-callback")?,
        )?
        .with_auth_url(Url::parse(&format!("{base}/login/oauth/authorize"))?)
        .with_token_url(Url::parse(&format!("{base}/login/oauth/access_token"))?)
        .with_user_url(Url::parse(&format!("{base}/user"))?)
        .with_provider_timeout(Duration::from_millis(500)))
    }

    #[test]
    fn authorization_url_carries_client_and_state() -> Result<()> {
        let config = AuthConfig::new(
            "client-id".to_string(),
            SecretString::from("client-secret"),
            SecretString::from("signing-key"),
            Url::parse("http://127.0.0.1:8080/oauth-callback")?,
        )?;
        let url = authorization_url(&config, "state-value");
        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");

        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("http://127.0.0.1:8080/oauth-callback")
        );
        assert_eq!(pairs.get("scope").map(String::as_str), Some("read:user"));
        assert_eq!(pairs.get("state").map(String::as_str), Some("state-value"));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_and_fetch_profile() -> Result<()> {
        let client = GitHubClient::new(&fake_provider().await?)?;
        let token = client.exchange_code("valid").await?;
        assert_eq!(token.secret(), "gho_valid");

        let identity = client.fetch_profile(&token).await?;
        assert_eq!(
            identity,
            RemoteIdentity {
                provider_user_id: 1001,
                login: "alice".to_string(),
                display_name: Some("Alice".to_string()),
                avatar_url: Some("https://avatars.example.test/alice".to_string()),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejected_code_is_an_error() -> Result<()> {
        let client = GitHubClient::new(&fake_provider().await?)?;
        let err = client.exchange_code("wrong").await;
        assert!(
            matches!(err, Err(ProviderError::Rejected(ref code)) if code == "bad_verification_code")
        );
        Ok(())
    }

    #[tokio::test]
    async fn provider_status_failure_is_an_error() -> Result<()> {
        let client = GitHubClient::new(&fake_provider().await?)?;
        let err = client.exchange_code("broken").await;
        assert!(matches!(err, Err(ProviderError::Status { status: 502, .. })));

        let err = client.fetch_profile(&AccessToken::new("gho_other")).await;
        assert!(matches!(err, Err(ProviderError::Status { status: 401, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn slow_provider_times_out() -> Result<()> {
        let client = GitHubClient::new(&fake_provider().await?)?;
        match client.exchange_code("slow").await {
            Err(ProviderError::Http(err)) => assert!(err.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn identity_tolerates_missing_optional_fields() -> Result<()> {
        let identity: RemoteIdentity =
            serde_json::from_value(json!({ "id": 7, "login": "bob", "name": null }))?;
        assert_eq!(identity.display_name, None);
        assert_eq!(identity.avatar_url, None);
        Ok(())
    }
}
