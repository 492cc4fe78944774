//! Session tokens and the cookie that carries them

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use super::SessionClaims;
use crate::config::Settings;
use crate::domain::users::Role;

/// Issues and verifies HS256 session tokens
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    cookie_name: String,
    ttl: Duration,
    secure_cookie: bool,
}

impl SessionKeys {
    pub fn new(secret: &str, cookie_name: &str, ttl_hours: i64, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            cookie_name: cookie_name.to_string(),
            ttl: Duration::hours(ttl_hours),
            secure_cookie,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.session_secret,
            &settings.session_cookie_name,
            settings.session_ttl_hours,
            !settings.env.is_dev(),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Sign a session token; returns the token and its expiry timestamp
    pub fn issue(&self, user_id: Uuid, email: &str, role: Role) -> Result<(String, i64)> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign session token")?;

        Ok((token, claims.exp))
    }

    /// Verify signature and expiry
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<SessionClaims>(token, &self.decoding, &validation)
            .context("Session token validation failed")?;

        Ok(data.claims)
    }

    /// HttpOnly cookie holding the session token
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .build()
    }

    /// Cookie that, when removed from the jar, clears the session in the browser
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), "")).path("/").build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn issued_tokens_verify() {
        let keys = SessionKeys::new(SECRET, "session", 24, false);
        let user_id = Uuid::new_v4();

        let (token, expires_at) = keys.issue(user_id, "ada@example.com", Role::Admin).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp, expires_at);
        assert!(expires_at > Utc::now().timestamp());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let keys = SessionKeys::new(SECRET, "session", 24, false);
        let other = SessionKeys::new("ffffffffffffffffffffffffffffffff", "session", 24, false);

        let (token, _) = other.issue(Uuid::new_v4(), "x@example.com", Role::User).unwrap();
        assert!(keys.verify(&token).is_err());
        assert!(keys.verify("not-a-token").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = SessionKeys::new(SECRET, "session", -1, false);
        let (token, _) = keys.issue(Uuid::new_v4(), "x@example.com", Role::User).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn session_cookie_attributes() {
        let keys = SessionKeys::new(SECRET, "sb_session", 24, true);
        let cookie = keys.session_cookie("abc".to_string());

        assert_eq!(cookie.name(), "sb_session");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
