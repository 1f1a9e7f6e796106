use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams, SearchParams};
use crate::{
    entities::material,
    errors::ServiceError,
    services::materials::{CreateMaterialInput, UpdateMaterialInput},
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/materials", get(list_materials))
        .route("/materials/:id", get(get_material))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/materials", post(create_material))
        .route(
            "/materials/:id",
            put(update_material).delete(delete_material),
        )
}

/// List materials
#[utoipa::path(
    get,
    path = "/api/v1/materials",
    params(PaginationParams, SearchParams),
    responses(
        (status = 200, description = "Materials page", body = ApiResponse<PaginatedResponse<material::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "materials"
)]
pub async fn list_materials(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(search): Query<SearchParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<material::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .materials
        .list_materials(page.page(), page.per_page(), search.search)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

/// Get a material
#[utoipa::path(
    get,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 200, description = "Material", body = ApiResponse<material::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "materials"
)]
pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<material::Model>>, ServiceError> {
    Ok(ok(state.services.materials.get_material(id).await?))
}

/// Create a material
#[utoipa::path(
    post,
    path = "/api/v1/materials",
    request_body = CreateMaterialInput,
    responses(
        (status = 201, description = "Material created", body = ApiResponse<material::Model>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already in use", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "materials"
)]
pub async fn create_material(
    State(state): State<AppState>,
    Json(input): Json<CreateMaterialInput>,
) -> Result<(StatusCode, Json<ApiResponse<material::Model>>), ServiceError> {
    Ok(created(state.services.materials.create_material(input).await?))
}

/// Update a material
#[utoipa::path(
    put,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    request_body = UpdateMaterialInput,
    responses(
        (status = 200, description = "Material updated", body = ApiResponse<material::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "materials"
)]
pub async fn update_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateMaterialInput>,
) -> Result<Json<ApiResponse<material::Model>>, ServiceError> {
    Ok(ok(state.services.materials.update_material(id, input).await?))
}

/// Delete a material that no assembly uses
#[utoipa::path(
    delete,
    path = "/api/v1/materials/{id}",
    params(("id" = Uuid, Path, description = "Material id")),
    responses(
        (status = 204, description = "Material deleted"),
        (status = 409, description = "Material is used by assemblies", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "materials"
)]
pub async fn delete_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.materials.delete_material(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
