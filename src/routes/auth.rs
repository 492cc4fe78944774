//! Authentication routes
//!
//! Email/password accounts with a signed session token delivered as an
//! HttpOnly cookie (and in the body for non-browser clients).

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::RequireAuth;
use crate::domain::users::{
    normalize_email, AuthResponse, LoginRequest, RegisterRequest, Role, UserResponse,
};
use crate::error::ApiError;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role: Role::parse(&row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, phone, role, created_at, updated_at";

pub(crate) async fn fetch_user(db: &sqlx::PgPool, user_id: Uuid) -> Result<Option<UserRow>, ApiError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    Ok(row)
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Issue a session for `user`, returning the cookie jar and response body
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: UserResponse,
) -> Result<(CookieJar, AuthResponse), ApiError> {
    let (token, expires_at) = state.sessions.issue(user.id, &user.email, user.role)?;
    let jar = jar.add(state.sessions.session_cookie(token.clone()));

    Ok((
        jar,
        AuthResponse {
            user,
            access_token: token,
            expires_at,
        },
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(ApiError::bad_request)?;

    let email = normalize_email(&req.email);

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;
    if exists {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = hash_password_blocking(req.password.clone()).await?;
    let role = if state.settings.is_admin_email(&email) {
        Role::Admin
    } else {
        Role::User
    };

    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name, phone, role)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
    .bind(role.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            return ApiError::conflict("An account with this email already exists");
        }
        ApiError::Database(e)
    })?;

    tracing::info!(user_id = %row.id, role = %row.role, "User registered");

    let (jar, body) = start_session(&state, jar, row.into())?;
    Ok((StatusCode::CREATED, jar, Json(DataResponse::new(body))))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);

    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE email = $1",
        USER_COLUMNS
    ))
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    if !verify_password_blocking(req.password.clone(), row.password_hash.clone()).await? {
        tracing::warn!(user_id = %row.id, "Failed login attempt");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    tracing::info!(user_id = %row.id, "User logged in");

    let (jar, body) = start_session(&state, jar, row.into())?;
    Ok((jar, Json(DataResponse::new(body))))
}

/// POST /auth/logout
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (jar.remove(state.sessions.removal_cookie()), NoContent)
}

/// GET /auth/session
///
/// Current user, read fresh from the database so role changes show up immediately.
pub async fn session(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let row = fetch_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    Ok(Json(DataResponse::new(UserResponse::from(row))))
}
