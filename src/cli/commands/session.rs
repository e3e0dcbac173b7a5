use crate::users::Role;
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use secrecy::SecretString;

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_TOKEN_TTL: &str = "token-ttl-seconds";
pub const ARG_DEFAULT_ROLE: &str = "default-role";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("HMAC key for HS256 session tokens")
                .env("CAT_JWT_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL)
                .long(ARG_TOKEN_TTL)
                .help("Session token lifetime in seconds")
                .env("CAT_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_DEFAULT_ROLE)
                .long(ARG_DEFAULT_ROLE)
                .help("Role given to users on first login")
                .env("CAT_DEFAULT_ROLE")
                .default_value("requester")
                .value_parser(PossibleValuesParser::new(["requester", "worker"])),
        )
}

#[derive(Debug)]
pub struct Options {
    pub signing_key: SecretString,
    pub token_ttl_seconds: i64,
    pub default_role: Role,
}

impl Options {
    /// # Errors
    /// Returns an error if the signing key is missing or empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let signing_key = matches
            .get_one::<String>(ARG_SIGNING_KEY)
            .cloned()
            .context("missing required argument: --signing-key")?;
        if signing_key.trim().is_empty() {
            return Err(anyhow!("--signing-key must not be empty"));
        }

        let default_role = matches
            .get_one::<String>(ARG_DEFAULT_ROLE)
            .map_or(Ok(Role::Requester), |raw| raw.parse::<Role>())?;

        Ok(Self {
            signing_key: SecretString::from(signing_key),
            token_ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL)
                .copied()
                .unwrap_or(86_400),
            default_role,
        })
    }
}
