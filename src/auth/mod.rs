//! GitHub login flow and session credentials.
//!
//! Flow Overview: `/login` stores a random state in the signed session cookie
//! and redirects to the provider. `/oauth-callback` checks the returned state
//! against the cookie before any network call, exchanges the code, resolves
//! the profile to a local user and redirects to the UI with a signed
//! credential. Protected routes verify that credential in [`require_user`].

use std::time::{SystemTime, UNIX_EPOCH};

pub mod csrf;
pub mod middleware;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod state;
pub mod token;

pub use csrf::{StateGenerator, generate_state};
pub use middleware::{UserId, require_user};
pub use provider::{
    AccessToken, GitHubClient, ProviderClient, ProviderError, RemoteIdentity, authorization_url,
};
pub use resolver::{IdentityResolver, ResolveError};
pub use session::{CookieSessionStore, SESSION_COOKIE_NAME, SessionError, SessionStore};
pub use state::{AuthConfig, AuthState};
pub use token::{SessionTokenService, TokenError};

/// Session key holding the pending login state.
pub const STATE_SESSION_KEY: &str = "state";

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}
