use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

use super::auth::{fetch_user, UserRow, USER_COLUMNS};
use crate::api::{DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::RequireAuth;
use crate::domain::users::{validate_password, ChangePasswordRequest, UpdateProfileRequest, UserResponse};
use crate::error::ApiError;

/// Trimmed value, or `None` when blank
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// PUT /me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if matches!(req.first_name.as_deref(), Some(n) if n.trim().is_empty())
        || matches!(req.last_name.as_deref(), Some(n) if n.trim().is_empty())
    {
        return Err(ApiError::bad_request("Names cannot be blank"));
    }

    let row = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone = CASE WHEN $4::text IS NULL THEN phone ELSE NULLIF($4, '') END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(non_blank(req.first_name.as_deref()))
    .bind(non_blank(req.last_name.as_deref()))
    .bind(req.phone.as_deref().map(str::trim))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(user_id = %auth.user_id, "Profile updated");

    Ok(Json(DataResponse::new(UserResponse::from(row))))
}

/// POST /me/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&req.new_password).map_err(ApiError::bad_request)?;

    let user = fetch_user(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password_blocking(req.current_password.clone(), user.password_hash.clone()).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password_blocking(req.new_password.clone()).await?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(auth.user_id)
        .bind(&password_hash)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %auth.user_id, "Password changed");

    Ok(NoContent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_dropped() {
        assert_eq!(non_blank(Some("  Ada ")), Some("Ada"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
