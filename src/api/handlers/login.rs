use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::{AuthState, STATE_SESSION_KEY, authorization_url};
use crate::error::{ApiError, ErrorBody};

#[utoipa::path(
    get,
    path = "/login",
    responses (
        (status = 307, description = "Redirect to the provider authorization page, pending state stored in the session cookie"),
        (status = 500, description = "Session cookie could not be written", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Result<Response, ApiError> {
    let (url, cookie) = build_login_redirect(&auth_state, &headers)?;
    debug!("redirecting to provider");
    Ok(([(SET_COOKIE, cookie)], Redirect::temporary(url.as_str())).into_response())
}

/// Store a fresh state in the session and build the provider URL carrying it.
///
/// A previous pending state in the same session is overwritten.
pub(crate) fn build_login_redirect(
    auth_state: &AuthState,
    headers: &HeaderMap,
) -> Result<(Url, HeaderValue), ApiError> {
    let state = auth_state.next_state();
    let cookie = auth_state
        .sessions()
        .put(headers, STATE_SESSION_KEY, &state)
        .map_err(ApiError::internal)?;
    Ok((authorization_url(auth_state.config(), &state), cookie))
}
