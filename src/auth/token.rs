//! HS256 session credentials carrying the local user id.
//!
//! Credentials are compact JWTs signed with the configured key. They are
//! stateless and expire on their own; there is no revocation list.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::{Error as JwtError, ErrorKind},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::AuthConfig;
use super::unix_now;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed session token")]
    Malformed,
    #[error("session token signature mismatch")]
    InvalidSignature,
    #[error("session token expired")]
    Expired,
    #[error("failed to encode session token")]
    Encode,
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::Malformed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub iat: i64,
    pub exp: i64,
}

pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl SessionTokenService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.signing_key().expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl_seconds: config.token_ttl_seconds(),
        }
    }

    /// Mint a credential for `user_id`, valid for the configured lifetime.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn mint(&self, user_id: i64) -> Result<String, TokenError> {
        self.mint_at(user_id, unix_now())
    }

    /// Verify a credential and return the user id it carries.
    ///
    /// Signature and algorithm are checked before expiry.
    ///
    /// # Errors
    /// Returns `Malformed`, `InvalidSignature` or `Expired`.
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims.sub)
    }

    pub(crate) fn mint_at(&self, user_id: i64, now: i64) -> Result<String, TokenError> {
        let claims = SessionClaims {
            sub: user_id,
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use base64ct::{Base64UrlUnpadded, Encoding};
    use secrecy::SecretString;
    use url::Url;

    fn service_with(key: &str, ttl: i64) -> Result<SessionTokenService> {
        let config = AuthConfig::new(
            "client-id".to_string(),
            SecretString::from("client-secret"),
            SecretString::from(key),
            Url::parse("http://127.0.0.1:8080/oauth-callback")?,
        )?
        .with_token_ttl_seconds(ttl);
        Ok(SessionTokenService::new(&config))
    }

    fn service() -> Result<SessionTokenService> {
        service_with("signing-key", 3600)
    }

    fn encode_json(value: &serde_json::Value) -> Result<String> {
        Ok(Base64UrlUnpadded::encode_string(&serde_json::to_vec(value)?))
    }

    #[test]
    fn mint_then_verify_returns_user_id() -> Result<()> {
        let service = service()?;
        let token = service.mint(42)?;
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(service.verify(&token)?, 42);
        Ok(())
    }

    #[test]
    fn claims_carry_ttl() -> Result<()> {
        let service = service()?;
        let token = service.mint_at(7, 1_000)?;
        let claims_part = token.split('.').nth(1).unwrap_or_default();
        let json = Base64UrlUnpadded::decode_vec(claims_part)
            .map_err(|err| anyhow!("claims are not base64url: {err}"))?;
        let claims: SessionClaims = serde_json::from_slice(&json)?;
        assert_eq!(
            claims,
            SessionClaims {
                sub: 7,
                iat: 1_000,
                exp: 4_600,
            }
        );
        Ok(())
    }

    #[test]
    fn header_names_hs256() -> Result<()> {
        let token = service()?.mint(1)?;
        let header = jsonwebtoken::decode_header(&token)?;
        assert_eq!(header.alg, Algorithm::HS256);
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<()> {
        let service = service()?;
        let now = unix_now();
        let fresh = service.mint_at(42, now - 3_590)?;
        assert_eq!(service.verify(&fresh)?, 42);
        let stale = service.mint_at(42, now - 3_610)?;
        assert_eq!(service.verify(&stale), Err(TokenError::Expired));
        Ok(())
    }

    #[test]
    fn expired_token_with_bad_signature_is_rejected() -> Result<()> {
        let token = service()?.mint_at(42, 1_000)?;
        let other = service_with("other-key", 3600)?;
        assert!(other.verify(&token).is_err());
        Ok(())
    }

    #[test]
    fn flipped_signature_byte_is_rejected() -> Result<()> {
        let service = service()?;
        let token = service.mint(42)?;
        let (signing_input, signature) = token.rsplit_once('.').unwrap_or_default();
        let mut bytes = Base64UrlUnpadded::decode_vec(signature)
            .map_err(|err| anyhow!("signature is not base64url: {err}"))?;
        bytes[0] ^= 0x01;
        let forged = format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&bytes)
        );
        assert_eq!(service.verify(&forged), Err(TokenError::InvalidSignature));
        Ok(())
    }

    #[test]
    fn token_from_other_key_is_rejected() -> Result<()> {
        let token = service_with("other-key", 3600)?.mint(42)?;
        assert_eq!(service()?.verify(&token), Err(TokenError::InvalidSignature));
        Ok(())
    }

    #[test]
    fn swapped_claims_are_rejected() -> Result<()> {
        let service = service()?;
        let token = service.mint(42)?;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = encode_json(&serde_json::json!({
            "sub": 1,
            "iat": 0,
            "exp": i64::MAX,
        }))?;
        let forged = format!("{}.{forged_claims}.{}", parts[0], parts[2]);
        assert_eq!(service.verify(&forged), Err(TokenError::InvalidSignature));
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_rejected() -> Result<()> {
        let service = service()?;
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert_eq!(service.verify(token), Err(TokenError::Malformed), "{token}");
        }
        Ok(())
    }

    #[test]
    fn unsigned_token_is_rejected() -> Result<()> {
        let service = service()?;
        let token = service.mint(42)?;
        let parts: Vec<&str> = token.split('.').collect();
        let none_header = encode_json(&serde_json::json!({"alg": "none", "typ": "JWT"}))?;
        let forged = format!("{none_header}.{}.", parts[1]);
        assert_eq!(service.verify(&forged), Err(TokenError::Malformed));
        Ok(())
    }

    #[test]
    fn other_hmac_algorithm_is_rejected() -> Result<()> {
        let claims = SessionClaims {
            sub: 42,
            iat: unix_now(),
            exp: unix_now() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"signing-key"),
        )?;
        assert_eq!(service()?.verify(&token), Err(TokenError::Malformed));
        Ok(())
    }
}
