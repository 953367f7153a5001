//! Cookie-backed sessions: a signed token carrying the user id, set as an
//! HttpOnly cookie. No session rows are persisted anywhere.

use std::time::Duration;

use axum::{
    extract::FromRef,
    http::{
        header::{InvalidHeaderValue, COOKIE},
        HeaderMap, HeaderValue,
    },
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{config::SessionConfig, state::AppState};

pub const SESSION_COOKIE: &str = "session";

/// Payload of the session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,       // user ID
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub remember: bool, // long-lived session requested at login
}

/// Signing and verification keys plus the two session lifetimes.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub session_ttl: Duration,
    pub remember_ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            ttl_minutes,
            remember_ttl_minutes,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            remember_ttl: Duration::from_secs((remember_ttl_minutes as u64) * 60),
        }
    }
}

impl SessionKeys {
    /// Bind a session to a user id. `remember` picks the longer lifetime.
    pub fn sign(&self, user_id: i64, remember: bool) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = if remember {
            self.remember_ttl
        } else {
            self.session_ttl
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = SessionClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            remember,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, remember, "session token signed");
        Ok(token)
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Validation::default())?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }

    /// Build the Set-Cookie value for a signed session token. A remembered
    /// session gets Max-Age; otherwise the cookie dies with the browser
    /// session and the token's own expiry bounds it.
    pub fn session_cookie(
        &self,
        token: &str,
        remember: bool,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let base = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
        let value = if remember {
            format!("{base}; Max-Age={}", self.remember_ttl.as_secs())
        } else {
            base
        };
        HeaderValue::from_str(&value)
    }
}

/// Set-Cookie value that drops the session cookie immediately.
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; Path=/; HttpOnly; Max-Age=0; SameSite=Lax")
}

/// Pull the session token out of the request's Cookie header, if present.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> SessionKeys {
        let state = AppState::fake();
        SessionKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.sign(42, false).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 42);
        assert!(!claims.remember);
    }

    #[tokio::test]
    async fn remembered_session_expires_later() {
        let keys = make_keys();
        let short = keys.verify(&keys.sign(1, false).unwrap()).unwrap();
        let long = keys.verify(&keys.sign(1, true).unwrap()).unwrap();
        assert!(long.remember);
        assert!(long.exp > short.exp);
    }

    #[tokio::test]
    async fn verify_rejects_token_signed_with_other_secret() {
        let keys = make_keys();
        let other = SessionKeys {
            encoding: EncodingKey::from_secret(b"other-secret"),
            decoding: DecodingKey::from_secret(b"other-secret"),
            session_ttl: Duration::from_secs(300),
            remember_ttl: Duration::from_secs(3600),
        };
        let token = other.sign(7, false).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn cookie_has_max_age_only_when_remembered() {
        let keys = make_keys();
        let token = keys.sign(1, false).unwrap();

        let plain = keys.session_cookie(&token, false).unwrap();
        let plain = plain.to_str().unwrap();
        assert!(plain.contains("HttpOnly"));
        assert!(plain.contains("SameSite=Lax"));
        assert!(!plain.contains("Max-Age"));

        let remembered = keys.session_cookie(&token, true).unwrap();
        let remembered = remembered.to_str().unwrap();
        assert!(remembered.contains("Max-Age=3600"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let value = clear_session_cookie();
        assert!(value.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn extract_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=abc.def.ghi"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn extract_token_missing_or_foreign_cookies() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert!(extract_session_token(&headers).is_none());
    }
}
