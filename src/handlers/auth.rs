use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::common::ok;
use crate::{
    auth::{AuthService, AuthUser, IssuedToken},
    entities::user,
    errors::ServiceError,
    services::users::ChangePasswordInput,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub user: user::Model,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Exchange credentials for a token; the token is also set as a session cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let (found, token) = state
        .auth
        .login(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            warn!(error = %e, "login rejected");
            ServiceError::from(e)
        })?;
    info!(user_id = %found.id, "user logged in");

    let cookie = state.auth.session_cookie(&token);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        ok(LoginResponse { token, user: found }),
    ))
}

/// Revoke the current token and clear the session cookie
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> impl IntoResponse {
    revoke_session(&state.auth, &user).await;
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, state.auth.clear_session_cookie())]),
    )
}

async fn revoke_session(auth: &AuthService, user: &AuthUser) {
    auth.revoke(&user.token_id, user.token_expires_at).await;
    info!(user_id = %user.user_id, "user logged out");
}

/// The signed-in user
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<user::Model>),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<user::Model>>, ServiceError> {
    Ok(ok(state.services.users.get_user(user.user_id).await?))
}

/// Change your own password
#[utoipa::path(
    post,
    path = "/api/v1/auth/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "Current password is incorrect", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn change_own_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ServiceError> {
    payload.validate()?;
    state
        .services
        .users
        .change_password(
            user.user_id,
            user.user_id,
            ChangePasswordInput {
                current_password: Some(payload.current_password),
                new_password: payload.new_password,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
