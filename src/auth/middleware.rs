//! Session credential middleware for protected routes.

use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, Uri, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::state::AuthState;
use crate::error::ApiError;

/// Local user id of the caller, present in request extensions after
/// [`require_user`] accepted the credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserId(pub i64);

/// Verify the session credential and expose the caller's [`UserId`].
///
/// The credential comes from `Authorization: Bearer`, or the `token` query
/// parameter when no header is sent. Any failure answers 401 without running
/// the inner handler.
pub async fn require_user(
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_credential(request.headers(), request.uri()) else {
        debug!("missing session credential");
        return ApiError::Unauthorized.into_response();
    };

    match auth_state.tokens().verify(&token) {
        Ok(user_id) => {
            request.extensions_mut().insert(UserId(user_id));
            next.run(request).await
        }
        Err(err) => {
            debug!(error = %err, "rejected session credential");
            ApiError::Unauthorized.into_response()
        }
    }
}

fn extract_credential(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_query_token(uri))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn extract_query_token(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_is_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let uri: Uri = "/api/me?token=from-query".parse().unwrap_or_default();
        assert_eq!(
            extract_credential(&headers, &uri).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn query_token_is_fallback() {
        let uri: Uri = "/api/me?x=1&token=abc.def.ghi".parse().unwrap_or_default();
        assert_eq!(
            extract_credential(&HeaderMap::new(), &uri).as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[test]
    fn other_schemes_and_empty_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        let uri: Uri = "/api/me?token=".parse().unwrap_or_default();
        assert_eq!(extract_credential(&headers, &uri), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
