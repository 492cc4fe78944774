use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use uuid::Uuid;

use super::AuthContext;
use crate::app::AppState;
use crate::error::ErrorResponse;

/// Extractor that requires a signed-in user.
///
/// The session token is read from the session cookie, falling back to an
/// `Authorization: Bearer` header for non-browser clients.
///
/// Example:
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken(String),
    NotAdmin,
    Lookup(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication required"),
            AuthError::InvalidFormat => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid authorization format"),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid or expired session"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "FORBIDDEN", "Admin privileges required"),
            AuthError::Lookup(e) => {
                tracing::error!(error = %e, "Failed to look up user role");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "An internal error occurred")
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Pull the session token out of the cookie jar or the Authorization header
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Result<String, AuthError> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Ok(cookie.value().to_string());
        }
    }

    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat)?;

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    Ok(token.to_string())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers, state.sessions.cookie_name())?;

        let claims = state.sessions.verify(&token).map_err(|e| {
            tracing::debug!(error = %e, "Session verification failed");
            AuthError::InvalidToken(e.to_string())
        })?;

        let context = AuthContext::from_claims(&claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build auth context");
            AuthError::InvalidToken(e.to_string())
        })?;

        Ok(RequireAuth(context))
    }
}

/// Extractor that requires admin privileges.
/// Uses RequireAuth internally and checks the role stored in the database, so a
/// demoted admin loses access before their session expires.
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    pub auth: RequireAuth,
}

impl RequireAdmin {
    pub fn user_id(&self) -> Uuid {
        self.auth.user_id
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state).await?;

        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?;

        if role.as_deref() != Some("admin") {
            tracing::warn!(user_id = %auth.user_id, "Non-admin user attempted to access admin route");
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin { auth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};

    #[test]
    fn cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session=cookie-token"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));

        assert_eq!(extract_session_token(&headers, "session").unwrap(), "cookie-token");
    }

    #[test]
    fn bearer_header_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        assert_eq!(extract_session_token(&headers, "session").unwrap(), "header-token");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            extract_session_token(&headers, "session"),
            Err(AuthError::InvalidFormat)
        ));
    }

    #[test]
    fn missing_credentials() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_session_token(&headers, "session"),
            Err(AuthError::MissingToken)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session="));
        assert!(matches!(
            extract_session_token(&headers, "session"),
            Err(AuthError::MissingToken)
        ));
    }
}
