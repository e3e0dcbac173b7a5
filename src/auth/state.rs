//! Auth configuration and the shared state handed to the login handlers.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::csrf::StateGenerator;
use super::provider::ProviderClient;
use super::resolver::IdentityResolver;
use super::session::SessionStore;
use super::token::SessionTokenService;
use crate::users::{Role, UserStore};

const DEFAULT_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const DEFAULT_USER_URL: &str = "https://api.github.com/user";
const DEFAULT_SCOPE: &str = "read:user";
const DEFAULT_LANDING_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_STATE_MAX_AGE_SECONDS: i64 = 10 * 60;
const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 10;

/// Process-wide auth settings, built once at startup and never mutated.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    client_id: String,
    client_secret: SecretString,
    signing_key: SecretString,
    callback_url: Url,
    landing_url: String,
    auth_url: Url,
    token_url: Url,
    user_url: Url,
    scopes: Vec<String>,
    token_ttl_seconds: i64,
    state_max_age_seconds: i64,
    provider_timeout: Duration,
    default_role: Role,
}

impl AuthConfig {
    /// Create a configuration pointing at GitHub with default lifetimes.
    ///
    /// # Errors
    /// Returns an error if one of the built-in provider endpoints fails to parse.
    pub fn new(
        client_id: String,
        client_secret: SecretString,
        signing_key: SecretString,
        callback_url: Url,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client_id,
            client_secret,
            signing_key,
            callback_url,
            landing_url: DEFAULT_LANDING_URL.to_string(),
            auth_url: Url::parse(DEFAULT_AUTH_URL)?,
            token_url: Url::parse(DEFAULT_TOKEN_URL)?,
            user_url: Url::parse(DEFAULT_USER_URL)?,
            scopes: vec![DEFAULT_SCOPE.to_string()],
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            state_max_age_seconds: DEFAULT_STATE_MAX_AGE_SECONDS,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECONDS),
            default_role: Role::Requester,
        })
    }

    #[must_use]
    pub fn with_landing_url(mut self, landing_url: &str) -> Self {
        self.landing_url = landing_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_user_url(mut self, url: Url) -> Self {
        self.user_url = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_state_max_age_seconds(mut self, seconds: i64) -> Self {
        self.state_max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: Role) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    pub(crate) fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    #[must_use]
    pub fn landing_url(&self) -> &str {
        &self.landing_url
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn user_url(&self) -> &Url {
        &self.user_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn state_max_age_seconds(&self) -> i64 {
        self.state_max_age_seconds
    }

    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }

    #[must_use]
    pub fn default_role(&self) -> Role {
        self.default_role
    }

    /// Cookies only carry `Secure` when the callback is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.callback_url.scheme() == "https"
    }
}

/// Capabilities shared by the login, callback and protected handlers.
pub struct AuthState {
    config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn ProviderClient>,
    users: Arc<dyn UserStore>,
    resolver: IdentityResolver,
    tokens: SessionTokenService,
    state_generator: StateGenerator,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn ProviderClient>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let resolver = IdentityResolver::new(users.clone(), config.default_role());
        let tokens = SessionTokenService::new(&config);
        Self {
            config,
            sessions,
            provider,
            users,
            resolver,
            tokens,
            state_generator: super::csrf::generate_state,
        }
    }

    /// Replace the state generator, used to pin login state in tests.
    #[must_use]
    pub fn with_state_generator(mut self, generator: StateGenerator) -> Self {
        self.state_generator = generator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub(crate) fn provider(&self) -> &dyn ProviderClient {
        self.provider.as_ref()
    }

    pub(crate) fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub(crate) fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokenService {
        &self.tokens
    }

    pub(crate) fn next_state(&self) -> String {
        (self.state_generator)()
    }
}
