//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{oauth, session};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or a URL is invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let oauth_opts = oauth::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        client_id: oauth_opts.client_id,
        client_secret: oauth_opts.client_secret,
        callback_url: oauth_opts.callback_url,
        landing_url: oauth_opts.landing_url,
        auth_url: oauth_opts.auth_url,
        token_url: oauth_opts.token_url,
        user_url: oauth_opts.user_url,
        provider_timeout_seconds: oauth_opts.provider_timeout_seconds,
        signing_key: session_opts.signing_key,
        token_ttl_seconds: session_opts.token_ttl_seconds,
        default_role: session_opts.default_role,
    }))
}
