use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams, SearchParams};
use crate::{
    entities::template,
    errors::ServiceError,
    services::{
        pricing::{PriceBreakdown, TakeoffLine},
        templates::{
            CreateTemplateInput, SelectionReport, TemplateDetail, UpdateTemplateInput,
            ValidateSelectionInput,
        },
    },
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DuplicateTemplateRequest {
    /// Name of the copy; defaults to "<name> (copy)"
    pub name: Option<String>,
}

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates))
        .route("/templates/validate", post(validate_selection))
        .route("/templates/:id", get(get_template))
        .route("/templates/:id/price", get(price_template))
        .route("/templates/:id/materials", get(material_takeoff))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/templates", post(create_template))
        .route("/templates/:id", put(update_template).delete(delete_template))
        .route("/templates/:id/duplicate", post(duplicate_template))
}

#[utoipa::path(
    get,
    path = "/api/v1/templates",
    params(PaginationParams, SearchParams),
    responses((status = 200, description = "Templates page", body = ApiResponse<PaginatedResponse<template::Model>>)),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn list_templates(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(filter): Query<SearchParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<template::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .templates
        .list_templates(page.page(), page.per_page(), filter.search, filter.category_id)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

/// Get a template with its assembly lines and attached groups
#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}",
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template", body = ApiResponse<TemplateDetail>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TemplateDetail>>, ServiceError> {
    Ok(ok(state.services.templates.get_template(id).await?))
}

/// Price roll-up of one unit of the template at current catalog prices
#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}/price",
    params(("id" = Uuid, Path, description = "Template id")),
    responses((status = 200, description = "Price breakdown", body = ApiResponse<PriceBreakdown>)),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn price_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PriceBreakdown>>, ServiceError> {
    Ok(ok(state.services.templates.price_template(id).await?))
}

/// Summed material quantities for one unit of the template
#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}/materials",
    params(("id" = Uuid, Path, description = "Template id")),
    responses((status = 200, description = "Material take-off", body = ApiResponse<Vec<TakeoffLine>>)),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn material_takeoff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<TakeoffLine>>>, ServiceError> {
    Ok(ok(state.services.templates.material_takeoff(id).await?))
}

/// Check a selection of assemblies against group rules without saving
#[utoipa::path(
    post,
    path = "/api/v1/templates/validate",
    request_body = ValidateSelectionInput,
    responses((status = 200, description = "Rule check result", body = ApiResponse<SelectionReport>)),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn validate_selection(
    State(state): State<AppState>,
    Json(input): Json<ValidateSelectionInput>,
) -> Result<Json<ApiResponse<SelectionReport>>, ServiceError> {
    Ok(ok(state.services.templates.validate_selection(input).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/templates",
    request_body = CreateTemplateInput,
    responses(
        (status = 201, description = "Template created", body = ApiResponse<TemplateDetail>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 422, description = "Group rules violated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn create_template(
    State(state): State<AppState>,
    Json(input): Json<CreateTemplateInput>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateDetail>>), ServiceError> {
    Ok(created(state.services.templates.create_template(input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/templates/{id}",
    params(("id" = Uuid, Path, description = "Template id")),
    request_body = UpdateTemplateInput,
    responses(
        (status = 200, description = "Template updated", body = ApiResponse<TemplateDetail>),
        (status = 422, description = "Group rules violated", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTemplateInput>,
) -> Result<Json<ApiResponse<TemplateDetail>>, ServiceError> {
    Ok(ok(state.services.templates.update_template(id, input).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/templates/{id}/duplicate",
    params(("id" = Uuid, Path, description = "Template id")),
    request_body = DuplicateTemplateRequest,
    responses((status = 201, description = "Copy created", body = ApiResponse<TemplateDetail>)),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn duplicate_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<DuplicateTemplateRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<TemplateDetail>>), ServiceError> {
    let name = body.and_then(|Json(req)| req.name);
    Ok(created(
        state.services.templates.duplicate_template(id, name).await?,
    ))
}

/// Delete a template no project was created from
#[utoipa::path(
    delete,
    path = "/api/v1/templates/{id}",
    params(("id" = Uuid, Path, description = "Template id")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 409, description = "Template is used by projects", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "templates"
)]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.templates.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
