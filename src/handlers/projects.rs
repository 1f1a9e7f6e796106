use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams};
use crate::{
    entities::project,
    errors::ServiceError,
    services::{
        pricing::{PriceBreakdown, TakeoffLine},
        projects::{ChangeStatusInput, CreateProjectInput, ProjectFilter, UpdateProjectInput},
    },
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/price", get(price_breakdown))
        .route("/projects/:id/materials", get(material_takeoff))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:id", put(update_project).delete(delete_project))
        .route("/projects/:id/status", post(change_status))
        .route("/projects/:id/reprice", post(reprice_project))
}

/// List projects, newest first
#[utoipa::path(
    get,
    path = "/api/v1/projects",
    params(PaginationParams, ProjectFilter),
    responses((status = 200, description = "Projects page", body = ApiResponse<PaginatedResponse<project::Model>>)),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<project::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .projects
        .list_projects(page.page(), page.per_page(), filter)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project", body = ApiResponse<project::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<project::Model>>, ServiceError> {
    Ok(ok(state.services.projects.get_project(id).await?))
}

/// Current catalog price of the project's template times its quantity
#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/price",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Price breakdown", body = ApiResponse<PriceBreakdown>)),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn price_breakdown(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PriceBreakdown>>, ServiceError> {
    Ok(ok(state.services.projects.price_breakdown(id).await?))
}

/// Materials to order for the whole project
#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/materials",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Material take-off", body = ApiResponse<Vec<TakeoffLine>>)),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn material_takeoff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<TakeoffLine>>>, ServiceError> {
    Ok(ok(state.services.projects.material_takeoff(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/projects",
    request_body = CreateProjectInput,
    responses(
        (status = 201, description = "Project created", body = ApiResponse<project::Model>),
        (status = 400, description = "Invalid input, client or template", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<ApiResponse<project::Model>>), ServiceError> {
    Ok(created(state.services.projects.create_project(input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectInput,
    responses((status = 200, description = "Project updated", body = ApiResponse<project::Model>)),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<ApiResponse<project::Model>>, ServiceError> {
    Ok(ok(state.services.projects.update_project(id, input).await?))
}

/// Move a project through its lifecycle
#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/status",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ChangeStatusInput,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<project::Model>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ChangeStatusInput>,
) -> Result<Json<ApiResponse<project::Model>>, ServiceError> {
    Ok(ok(state
        .services
        .projects
        .change_status(id, input.status)
        .await?))
}

/// Refresh the stored total from current catalog prices
#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/reprice",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project repriced", body = ApiResponse<project::Model>),
        (status = 400, description = "Project cannot be repriced", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn reprice_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<project::Model>>, ServiceError> {
    Ok(ok(state.services.projects.reprice(id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 400, description = "Project is underway", body = crate::errors::ErrorResponse),
        (status = 409, description = "Project has uploads", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "projects"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.projects.delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
