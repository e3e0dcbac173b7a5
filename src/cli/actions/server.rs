use crate::{
    api,
    auth::{AuthConfig, AuthState, CookieSessionStore, GitHubClient},
    users::{Role, SqliteUserStore, ensure_schema},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: Url,
    pub landing_url: String,
    pub auth_url: Option<Url>,
    pub token_url: Option<Url>,
    pub user_url: Option<Url>,
    pub provider_timeout_seconds: u64,
    pub signing_key: SecretString,
    pub token_ttl_seconds: i64,
    pub default_role: Role,
}

impl Args {
    /// Fold the parsed arguments into the login configuration.
    ///
    /// # Errors
    /// Returns an error if a default provider endpoint fails to parse.
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let mut config = AuthConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.signing_key.clone(),
            self.callback_url.clone(),
        )?
        .with_landing_url(&self.landing_url)
        .with_token_ttl_seconds(self.token_ttl_seconds)
        .with_provider_timeout(Duration::from_secs(self.provider_timeout_seconds))
        .with_default_role(self.default_role);

        if let Some(url) = &self.auth_url {
            config = config.with_auth_url(url.clone());
        }
        if let Some(url) = &self.token_url {
            config = config.with_token_url(url.clone());
        }
        if let Some(url) = &self.user_url {
            config = config.with_user_url(url.clone());
        }

        Ok(config)
    }
}

/// Open (or create) the SQLite database and make sure the users table exists.
///
/// # Errors
/// Returns an error if the DSN is invalid or the database cannot be reached.
pub async fn connect(dsn: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(dsn)
        .with_context(|| format!("invalid --dsn: {dsn}"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    ensure_schema(&pool)
        .await
        .context("Failed to create users table")?;

    Ok(pool)
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database or the provider client cannot be set up, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.auth_config()?;
    debug!(
        callback_url = %config.callback_url(),
        landing_url = config.landing_url(),
        "Login configuration loaded"
    );

    let pool = connect(&args.dsn).await?;
    info!("Connected to database");

    let sessions = Arc::new(
        CookieSessionStore::new(
            config.client_secret(),
            config.state_max_age_seconds(),
            config.cookie_secure(),
        )
        .context("Failed to build session store")?,
    );
    let provider = Arc::new(GitHubClient::new(&config).context("Failed to build provider client")?);
    let users = Arc::new(SqliteUserStore::new(pool.clone()));

    let auth_state = Arc::new(AuthState::new(config, sessions, provider, users));

    api::new(args.port, pool, auth_state).await
}
