//! # code-annotation (GitHub login)
//!
//! Signs annotators into the code annotation tool with GitHub OAuth and hands
//! the UI a short-lived HS256 bearer token.
//!
//! ## Flow
//!
//! - `GET /login` stores a random `state` in a signed cookie and redirects to
//!   the provider's authorization endpoint.
//! - `GET /oauth-callback` checks the returned `state` against the cookie,
//!   exchanges the code, fetches the profile, finds or creates the local user
//!   and redirects to the UI with `?token=<jwt>`.
//! - Routes behind [`auth::require_user`] accept the token as a `Bearer`
//!   header or a `token` query parameter and expose the user id to handlers.
//!
//! The first login for a GitHub handle is race-safe: the `users.login` unique
//! constraint decides the winner and the loser re-reads the row.

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod users;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
