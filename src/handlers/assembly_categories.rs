use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok};
use crate::{
    entities::assembly_category,
    errors::ServiceError,
    services::assembly_categories::{CategoryInput, UpdateCategoryInput},
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/assembly-categories", get(list_categories))
        .route("/assembly-categories/:id", get(get_category))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/assembly-categories", post(create_category))
        .route(
            "/assembly-categories/:id",
            put(update_category).delete(delete_category),
        )
}

/// List assembly categories by name
#[utoipa::path(
    get,
    path = "/api/v1/assembly-categories",
    responses((status = 200, description = "Categories", body = ApiResponse<Vec<assembly_category::Model>>)),
    security(("Bearer" = [])),
    tag = "assembly-categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<assembly_category::Model>>>, ServiceError> {
    Ok(ok(state.services.assembly_categories.list_categories().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly-categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category", body = ApiResponse<assembly_category::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<assembly_category::Model>>, ServiceError> {
    Ok(ok(state.services.assembly_categories.get_category(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly-categories",
    request_body = CategoryInput,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<assembly_category::Model>),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<ApiResponse<assembly_category::Model>>), ServiceError> {
    Ok(created(
        state.services.assembly_categories.create_category(input).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/assembly-categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    request_body = UpdateCategoryInput,
    responses((status = 200, description = "Category updated", body = ApiResponse<assembly_category::Model>)),
    security(("Bearer" = [])),
    tag = "assembly-categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<ApiResponse<assembly_category::Model>>, ServiceError> {
    Ok(ok(state
        .services
        .assembly_categories
        .update_category(id, input)
        .await?))
}

/// Delete a category; its assemblies, groups and templates become uncategorized
#[utoipa::path(
    delete,
    path = "/api/v1/assembly-categories/{id}",
    params(("id" = Uuid, Path, description = "Category id")),
    responses((status = 204, description = "Category deleted")),
    security(("Bearer" = [])),
    tag = "assembly-categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.assembly_categories.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
