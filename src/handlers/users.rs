use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams};
use crate::{
    auth::AuthUser,
    entities::user,
    errors::ServiceError,
    services::users::{ChangePasswordInput, CreateUserInput, UpdateUserInput},
    ApiResponse, AppState,
};

/// Create a user
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserInput,
    responses(
        (status = 201, description = "User created", body = ApiResponse<user::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    current_user: AuthUser,
    Json(payload): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<ApiResponse<user::Model>>), ServiceError> {
    let user = state.services.users.create_user(payload).await?;
    info!(user_id = %user.id, created_by = %current_user.user_id, "User created");
    Ok(created(user))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User returned", body = ApiResponse<user::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<user::Model>>, ServiceError> {
    Ok(ok(state.services.users.get_user(user_id).await?))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserInput,
    responses(
        (status = 200, description = "User updated", body = ApiResponse<user::Model>),
        (status = 400, description = "Would leave no active admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserInput>,
) -> Result<Json<ApiResponse<user::Model>>, ServiceError> {
    Ok(ok(state.services.users.update_user(user_id, payload).await?))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    current_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .users
        .delete_user(user_id, current_user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List all users with pagination
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Users listed", body = ApiResponse<PaginatedResponse<user::Model>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<user::Model>>>, ServiceError> {
    let (users, total) = state
        .services
        .users
        .list_users(pagination.page(), pagination.per_page())
        .await?;
    Ok(ok(PaginatedResponse::new(users, &pagination, total)))
}

/// Set a user's password
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/change-password",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = ChangePasswordInput,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Current password is incorrect", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "users"
)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ChangePasswordInput>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .users
        .change_password(user_id, current_user.user_id, payload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Creates the router for user endpoints
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/change-password", post(change_password))
}
