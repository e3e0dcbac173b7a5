//! Cookie-backed session store holding the pending login state.
//!
//! The whole session lives in one cookie: a JSON payload carrying an
//! HMAC-SHA256 tag added by the signed cookie jar. Nothing is kept server
//! side, so any instance sharing the key can read the cookie back.

use axum::{
    http::{
        HeaderMap, HeaderValue,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use thiserror::Error;
use time::Duration;
use tracing::debug;

use super::unix_now;

pub const SESSION_COOKIE_NAME: &str = "cat_session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode session payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid session key")]
    Key,
    #[error("invalid session cookie header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("session cookie was not rendered")]
    NotRendered,
}

/// Per-browser key/value storage scoped to a single session cookie.
///
/// Reads never fail: a cookie that is missing, malformed, tampered with or
/// too old reads as an empty session.
pub trait SessionStore: Send + Sync {
    fn get(&self, headers: &HeaderMap, key: &str) -> Option<String>;

    /// Store `value` under `key`, returning the `Set-Cookie` value to send.
    ///
    /// # Errors
    /// Returns an error if the session cannot be encoded.
    fn put(&self, headers: &HeaderMap, key: &str, value: &str)
    -> Result<HeaderValue, SessionError>;

    /// Drop `key`, returning the `Set-Cookie` value to send.
    ///
    /// # Errors
    /// Returns an error if the remaining session cannot be encoded.
    fn remove(&self, headers: &HeaderMap, key: &str) -> Result<HeaderValue, SessionError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionPayload {
    iat: i64,
    values: BTreeMap<String, String>,
}

pub struct CookieSessionStore {
    key: Key,
    max_age_seconds: i64,
    secure: bool,
}

impl CookieSessionStore {
    /// The 64-byte jar key is the SHA-512 digest of `secret`.
    ///
    /// # Errors
    /// Returns an error if the jar rejects the derived key.
    pub fn new(
        secret: &SecretString,
        max_age_seconds: i64,
        secure: bool,
    ) -> Result<Self, SessionError> {
        let digest = Sha512::digest(secret.expose_secret().as_bytes());
        let key = Key::try_from(digest.as_slice()).map_err(|_| SessionError::Key)?;
        Ok(Self {
            key,
            max_age_seconds,
            secure,
        })
    }

    fn jar(&self, headers: &HeaderMap) -> SignedCookieJar {
        SignedCookieJar::from_headers(headers, self.key.clone())
    }

    fn load_at(&self, headers: &HeaderMap, now: i64) -> BTreeMap<String, String> {
        let Some(cookie) = self.jar(headers).get(SESSION_COOKIE_NAME) else {
            return BTreeMap::new();
        };
        match serde_json::from_str::<SessionPayload>(cookie.value()) {
            Ok(payload) if now.saturating_sub(payload.iat) <= self.max_age_seconds => {
                payload.values
            }
            Ok(_) => {
                debug!("ignoring stale session cookie");
                BTreeMap::new()
            }
            Err(err) => {
                debug!("ignoring unreadable session cookie: {}", err);
                BTreeMap::new()
            }
        }
    }

    fn write_cookie(
        &self,
        headers: &HeaderMap,
        values: BTreeMap<String, String>,
        now: i64,
    ) -> Result<HeaderValue, SessionError> {
        if values.is_empty() {
            return self.clear_cookie();
        }
        let payload = serde_json::to_string(&SessionPayload { iat: now, values })?;
        let cookie = Cookie::build((SESSION_COOKIE_NAME, payload))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::seconds(self.max_age_seconds))
            .build();

        let response = self.jar(headers).add(cookie).into_response();
        response
            .headers()
            .get(SET_COOKIE)
            .cloned()
            .ok_or(SessionError::NotRendered)
    }

    fn clear_cookie(&self) -> Result<HeaderValue, SessionError> {
        let cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::ZERO)
            .build();
        Ok(HeaderValue::from_str(&cookie.to_string())?)
    }
}

impl SessionStore for CookieSessionStore {
    fn get(&self, headers: &HeaderMap, key: &str) -> Option<String> {
        self.load_at(headers, unix_now()).remove(key)
    }

    fn put(
        &self,
        headers: &HeaderMap,
        key: &str,
        value: &str,
    ) -> Result<HeaderValue, SessionError> {
        let now = unix_now();
        let mut values = self.load_at(headers, now);
        values.insert(key.to_string(), value.to_string());
        self.write_cookie(headers, values, now)
    }

    fn remove(&self, headers: &HeaderMap, key: &str) -> Result<HeaderValue, SessionError> {
        let now = unix_now();
        let mut values = self.load_at(headers, now);
        values.remove(key);
        self.write_cookie(headers, values, now)
    }
}
