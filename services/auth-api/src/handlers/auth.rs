//! Authentication handlers (register, login, refresh, me)

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use castgate_axum::RequireAuth;
use castgate_types::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest, Role, UserInfo,
};
use metrics::counter;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::users::Authentication;

/// POST /auth/register
///
/// Create an account. `role` defaults to viewer; admin cannot be self-assigned.
#[instrument(skip_all, level = "debug")]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserInfo>)> {
    let role = match req.role.as_deref() {
        None => Role::default(),
        Some(name) => name
            .parse::<Role>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
    };
    if role == Role::Admin {
        return Err(ApiError::BadRequest("admin role cannot be self-assigned".to_string()));
    }

    let user = state.users.register(&req.email, &req.password, role).await?;
    info!(subject_id = %user.id, role = %role, "User registered");
    counter!("auth_registrations_total").increment(1);

    Ok((StatusCode::CREATED, Json(user.info())))
}

/// POST /auth/login
///
/// Exchange credentials for a token pair.
#[instrument(skip_all, level = "debug")]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = match state.users.authenticate(&req.email, &req.password).await {
        Authentication::Success(user) => user,
        Authentication::Inactive => {
            warn!("Login refused for inactive account");
            counter!("auth_logins_total", "outcome" => "inactive").increment(1);
            return Err(ApiError::AccountInactive);
        }
        Authentication::Rejected => {
            warn!("Login rejected");
            counter!("auth_logins_total", "outcome" => "rejected").increment(1);
            return Err(ApiError::InvalidCredentials);
        }
    };

    let pair = state.tokens.issue(&user)?;
    info!(subject_id = %user.id, "User logged in");
    counter!("auth_logins_total", "outcome" => "success").increment(1);

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: user.info(),
    }))
}

/// POST /auth/refresh
///
/// Rotate a refresh token into a new pair.
#[instrument(skip_all, level = "debug")]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let users = state.users.clone();
    match state.tokens.rotate(&req.refresh_token, |id| users.find_active(id)) {
        Ok(pair) => {
            counter!("auth_refreshes_total", "outcome" => "success").increment(1);
            Ok(Json(pair))
        }
        Err(err) => {
            warn!(error = %err, "Refresh rejected");
            counter!("auth_refreshes_total", "outcome" => "rejected").increment(1);
            Err(err.into())
        }
    }
}

/// GET /auth/me
///
/// The identity the guard attached to this request.
pub async fn me(RequireAuth(ctx): RequireAuth) -> Json<UserInfo> {
    Json(UserInfo {
        id: ctx.subject_id,
        email: ctx.email,
        roles: ctx.roles,
    })
}
