use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams, SearchParams};
use crate::{
    entities::{assembly, assembly_material},
    errors::ServiceError,
    services::{
        assemblies::{AssemblyDetail, AssemblyMaterialInput, CreateAssemblyInput, UpdateAssemblyInput},
        pricing::AssemblyBreakdown,
    },
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/assemblies", get(list_assemblies))
        .route("/assemblies/:id", get(get_assembly))
        .route("/assemblies/:id/price", get(price_assembly))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/assemblies", post(create_assembly))
        .route(
            "/assemblies/:id",
            put(update_assembly).delete(delete_assembly),
        )
        .route(
            "/assemblies/:id/materials",
            put(replace_materials).post(upsert_material),
        )
        .route(
            "/assemblies/:id/materials/:material_id",
            delete(remove_material),
        )
}

/// List assemblies
#[utoipa::path(
    get,
    path = "/api/v1/assemblies",
    params(PaginationParams, SearchParams),
    responses((status = 200, description = "Assemblies page", body = ApiResponse<PaginatedResponse<assembly::Model>>)),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn list_assemblies(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(filter): Query<SearchParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<assembly::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .assemblies
        .list_assemblies(page.page(), page.per_page(), filter.search, filter.category_id)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

/// Get an assembly with its bill of materials
#[utoipa::path(
    get,
    path = "/api/v1/assemblies/{id}",
    params(("id" = Uuid, Path, description = "Assembly id")),
    responses(
        (status = 200, description = "Assembly", body = ApiResponse<AssemblyDetail>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn get_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AssemblyDetail>>, ServiceError> {
    Ok(ok(state.services.assemblies.get_assembly(id).await?))
}

/// Cost of one unit of an assembly
#[utoipa::path(
    get,
    path = "/api/v1/assemblies/{id}/price",
    params(("id" = Uuid, Path, description = "Assembly id")),
    responses((status = 200, description = "Cost breakdown", body = ApiResponse<AssemblyBreakdown>)),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn price_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AssemblyBreakdown>>, ServiceError> {
    Ok(ok(state.services.assemblies.price_assembly(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/assemblies",
    request_body = CreateAssemblyInput,
    responses(
        (status = 201, description = "Assembly created", body = ApiResponse<AssemblyDetail>),
        (status = 400, description = "Invalid input or unknown material", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn create_assembly(
    State(state): State<AppState>,
    Json(input): Json<CreateAssemblyInput>,
) -> Result<(StatusCode, Json<ApiResponse<AssemblyDetail>>), ServiceError> {
    Ok(created(state.services.assemblies.create_assembly(input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/assemblies/{id}",
    params(("id" = Uuid, Path, description = "Assembly id")),
    request_body = UpdateAssemblyInput,
    responses((status = 200, description = "Assembly updated", body = ApiResponse<assembly::Model>)),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn update_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateAssemblyInput>,
) -> Result<Json<ApiResponse<assembly::Model>>, ServiceError> {
    Ok(ok(state.services.assemblies.update_assembly(id, input).await?))
}

/// Replace the whole bill of materials
#[utoipa::path(
    put,
    path = "/api/v1/assemblies/{id}/materials",
    params(("id" = Uuid, Path, description = "Assembly id")),
    request_body = Vec<AssemblyMaterialInput>,
    responses((status = 200, description = "Materials replaced", body = ApiResponse<AssemblyDetail>)),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn replace_materials(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(lines): Json<Vec<AssemblyMaterialInput>>,
) -> Result<Json<ApiResponse<AssemblyDetail>>, ServiceError> {
    Ok(ok(state.services.assemblies.replace_materials(id, lines).await?))
}

/// Add a material or change its quantity
#[utoipa::path(
    post,
    path = "/api/v1/assemblies/{id}/materials",
    params(("id" = Uuid, Path, description = "Assembly id")),
    request_body = AssemblyMaterialInput,
    responses((status = 200, description = "Line stored", body = ApiResponse<assembly_material::Model>)),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn upsert_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(line): Json<AssemblyMaterialInput>,
) -> Result<Json<ApiResponse<assembly_material::Model>>, ServiceError> {
    Ok(ok(state.services.assemblies.upsert_material(id, line).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/assemblies/{id}/materials/{material_id}",
    params(
        ("id" = Uuid, Path, description = "Assembly id"),
        ("material_id" = Uuid, Path, description = "Material id"),
    ),
    responses((status = 204, description = "Line removed")),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn remove_material(
    State(state): State<AppState>,
    Path((id, material_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .assemblies
        .remove_material(id, material_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete an assembly no template uses
#[utoipa::path(
    delete,
    path = "/api/v1/assemblies/{id}",
    params(("id" = Uuid, Path, description = "Assembly id")),
    responses(
        (status = 204, description = "Assembly deleted"),
        (status = 409, description = "Assembly is used by templates", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assemblies"
)]
pub async fn delete_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.assemblies.delete_assembly(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
