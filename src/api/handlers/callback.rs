//! Provider callback: validate state, exchange the code, resolve the user and
//! hand a session credential to the UI.
//!
//! Stages run strictly in order and any failure ends the login:
//! `AwaitingState -> StateValidated -> Exchanged -> IdentityResolved -> Issued`.
//! State is checked before the provider is contacted, so a forged callback
//! never costs a network round trip. A callback that passed the state check
//! clears the pending state on every outcome.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::IntoParams;

use crate::auth::{AuthState, STATE_SESSION_KEY};
use crate::error::{ApiError, ErrorBody};

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// State echoed back by the provider.
    state: Option<String>,
    /// Authorization code to exchange.
    code: Option<String>,
    /// Set by the provider when the user denied access.
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    AwaitingState,
    StateValidated,
    Exchanged,
    IdentityResolved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingState => "awaiting_state",
            Self::StateValidated => "state_validated",
            Self::Exchanged => "exchanged",
            Self::IdentityResolved => "identity_resolved",
        };
        f.write_str(name)
    }
}

#[utoipa::path(
    get,
    path = "/oauth-callback",
    params(CallbackParams),
    responses (
        (status = 307, description = "Redirect to the landing page with `?token=<credential>`"),
        (status = 412, description = "Missing or mismatching state, restart from /login", body = ErrorBody),
        (status = 500, description = "Code exchange, profile fetch or user resolution failed", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn callback(
    headers: HeaderMap,
    Extension(auth_state): Extension<Arc<AuthState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    validate_state(&auth_state, &headers, params.state.as_deref())?;

    // The pending state is spent once it matched, whatever happens next.
    let cleared = auth_state
        .sessions()
        .remove(&headers, STATE_SESSION_KEY)
        .map_err(|err| rejected(Stage::StateValidated, ApiError::internal(err)))?;

    let outcome = match issue(&auth_state, &params).await {
        Ok(landing) => Redirect::temporary(&landing).into_response(),
        Err(err) => err.into_response(),
    };
    Ok(([(SET_COOKIE, cleared)], outcome).into_response())
}

/// Run the provider round trips and mint the credential, returning the
/// landing URL that carries it.
async fn issue(auth_state: &AuthState, params: &CallbackParams) -> Result<String, ApiError> {
    if let Some(provider_error) = params.error.as_deref() {
        let description = params.error_description.as_deref().unwrap_or_default();
        return Err(rejected(
            Stage::StateValidated,
            ApiError::internal(anyhow::anyhow!(
                "provider returned {provider_error}: {description}"
            )),
        ));
    }

    let code = params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            rejected(
                Stage::StateValidated,
                ApiError::internal(anyhow::anyhow!("callback without code")),
            )
        })?;

    let token = auth_state
        .provider()
        .exchange_code(code)
        .await
        .map_err(|err| rejected(Stage::StateValidated, ApiError::internal(err)))?;

    let remote = auth_state
        .provider()
        .fetch_profile(&token)
        .await
        .map_err(|err| rejected(Stage::Exchanged, ApiError::internal(err)))?;

    let user = auth_state
        .resolver()
        .resolve(&remote)
        .await
        .map_err(|err| rejected(Stage::Exchanged, ApiError::internal(err)))?;

    let credential = auth_state
        .tokens()
        .mint(user.id)
        .map_err(|err| rejected(Stage::IdentityResolved, ApiError::internal(err)))?;

    info!(user_id = user.id, login = %user.login, "login completed");

    Ok(format!(
        "{}/?token={credential}",
        auth_state.config().landing_url()
    ))
}

/// Compare the `state` query parameter with the one stored at `/login`.
fn validate_state(
    auth_state: &AuthState,
    headers: &HeaderMap,
    received: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = auth_state.sessions().get(headers, STATE_SESSION_KEY) else {
        warn!(stage = %Stage::AwaitingState, "no pending login state in session");
        return Err(ApiError::StateMismatch);
    };
    match received {
        Some(received) if received == expected => Ok(()),
        Some(_) => {
            warn!(stage = %Stage::AwaitingState, "login state mismatch");
            Err(ApiError::StateMismatch)
        }
        None => {
            warn!(stage = %Stage::AwaitingState, "callback without state parameter");
            Err(ApiError::StateMismatch)
        }
    }
}

/// Record the stage a login died in; the cause is logged with the response.
fn rejected(stage: Stage, err: ApiError) -> ApiError {
    warn!(stage = %stage, "login rejected");
    err
}
