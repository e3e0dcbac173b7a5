use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_CLIENT_SECRET: &str = "client-secret";
pub const ARG_CALLBACK_URL: &str = "callback-url";
pub const ARG_LANDING_URL: &str = "landing-url";
pub const ARG_AUTH_URL: &str = "auth-url";
pub const ARG_TOKEN_URL: &str = "token-url";
pub const ARG_USER_URL: &str = "user-url";
pub const ARG_PROVIDER_TIMEOUT: &str = "provider-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("GitHub OAuth application client id")
                .env("CAT_OAUTH_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("GitHub OAuth application client secret, also keys the login cookie signature")
                .env("CAT_OAUTH_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CALLBACK_URL)
                .long(ARG_CALLBACK_URL)
                .help("Redirect URI registered with the provider")
                .env("CAT_OAUTH_CALLBACK_URL")
                .default_value("http://127.0.0.1:8080/oauth-callback"),
        )
        .arg(
            Arg::new(ARG_LANDING_URL)
                .long(ARG_LANDING_URL)
                .help("UI origin that receives ?token=<jwt> after login")
                .env("CAT_UI_DOMAIN")
                .default_value("http://127.0.0.1:8080"),
        )
        .arg(
            Arg::new(ARG_AUTH_URL)
                .long(ARG_AUTH_URL)
                .help("Provider authorization endpoint")
                .env("CAT_OAUTH_AUTH_URL"),
        )
        .arg(
            Arg::new(ARG_TOKEN_URL)
                .long(ARG_TOKEN_URL)
                .help("Provider code exchange endpoint")
                .env("CAT_OAUTH_TOKEN_URL"),
        )
        .arg(
            Arg::new(ARG_USER_URL)
                .long(ARG_USER_URL)
                .help("Provider profile endpoint")
                .env("CAT_OAUTH_USER_URL"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT)
                .long(ARG_PROVIDER_TIMEOUT)
                .help("Timeout for each provider request in seconds")
                .env("CAT_PROVIDER_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: Url,
    pub landing_url: String,
    pub auth_url: Option<Url>,
    pub token_url: Option<Url>,
    pub user_url: Option<Url>,
    pub provider_timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required value is missing or a URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let client_id = matches
            .get_one::<String>(ARG_CLIENT_ID)
            .cloned()
            .context("missing required argument: --client-id")?;
        let client_secret = matches
            .get_one::<String>(ARG_CLIENT_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --client-secret")?;
        let callback_url = optional_url(matches, ARG_CALLBACK_URL)?
            .context("missing required argument: --callback-url")?;
        let landing_url = matches
            .get_one::<String>(ARG_LANDING_URL)
            .cloned()
            .context("missing required argument: --landing-url")?;

        Ok(Self {
            client_id,
            client_secret,
            callback_url,
            landing_url,
            auth_url: optional_url(matches, ARG_AUTH_URL)?,
            token_url: optional_url(matches, ARG_TOKEN_URL)?,
            user_url: optional_url(matches, ARG_USER_URL)?,
            provider_timeout_seconds: matches
                .get_one::<u64>(ARG_PROVIDER_TIMEOUT)
                .copied()
                .unwrap_or(10),
        })
    }
}

fn optional_url(matches: &ArgMatches, name: &str) -> Result<Option<Url>> {
    matches
        .get_one::<String>(name)
        .map(|raw| Url::parse(raw).with_context(|| format!("invalid --{name}: {raw}")))
        .transpose()
}
