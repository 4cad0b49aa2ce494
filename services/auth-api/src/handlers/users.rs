//! User management handlers
//!
//! Profile updates for the caller, and admin-only role and status changes.
//! Changes reach access tokens at the next refresh; deactivation also revokes
//! every refresh token the account holds.

use axum::extract::{Path, State};
use axum::Json;
use castgate_axum::{RequireAdmin, RequireAuth};
use castgate_types::{Role, UpdateProfileRequest, UpdateRoleRequest, UpdateStatusRequest, UserInfo};
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// PUT /auth/me
///
/// Partial update of the caller's email and password.
#[instrument(skip_all, level = "debug")]
pub async fn update_profile(
    RequireAuth(ctx): RequireAuth,
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserInfo>> {
    if req.email.is_none() && req.password.is_none() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let user = state
        .users
        .update_profile(&ctx.subject_id, req.email.as_deref(), req.password.as_deref())
        .await?;
    info!(subject_id = %user.id, "Profile updated");

    Ok(Json(user.info()))
}

/// PUT /auth/users/:id/role
///
/// Replace a user's role. Admin only.
#[instrument(skip_all, level = "debug")]
pub async fn update_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<UserInfo>> {
    let role: Role = req.role.parse().map_err(|_| {
        let valid: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
        ApiError::BadRequest(format!("Invalid role. Must be one of: {}", valid.join(", ")))
    })?;

    let user = state.users.set_role(&id, role)?;
    info!(subject_id = %user.id, role = %role, changed_by = %admin.subject_id, "Role changed");

    Ok(Json(user.info()))
}

/// PUT /auth/users/:id/status
///
/// Activate or deactivate an account. Admin only.
#[instrument(skip_all, level = "debug")]
pub async fn update_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<UserInfo>> {
    let user = state.users.set_active(&id, req.active)?;
    if !req.active {
        let revoked = state.tokens.revoke_user(&id);
        info!(subject_id = %user.id, revoked, changed_by = %admin.subject_id, "Account deactivated");
    } else {
        info!(subject_id = %user.id, changed_by = %admin.subject_id, "Account activated");
    }

    Ok(Json(user.info()))
}
