use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok, PaginatedResponse, PaginationParams, SearchParams};
use crate::{
    entities::{client, project},
    errors::ServiceError,
    services::clients::{CreateClientInput, UpdateClientInput},
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/:id", get(get_client))
        .route("/clients/:id/projects", get(client_projects))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/clients", post(create_client))
        .route("/clients/:id", put(update_client).delete(delete_client))
}

/// List clients
#[utoipa::path(
    get,
    path = "/api/v1/clients",
    params(PaginationParams, SearchParams),
    responses((status = 200, description = "Clients page", body = ApiResponse<PaginatedResponse<client::Model>>)),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn list_clients(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
    Query(search): Query<SearchParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<client::Model>>>, ServiceError> {
    let (items, total) = state
        .services
        .clients
        .list_clients(page.page(), page.per_page(), search.search)
        .await?;
    Ok(ok(PaginatedResponse::new(items, &page, total)))
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client", body = ApiResponse<client::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<client::Model>>, ServiceError> {
    Ok(ok(state.services.clients.get_client(id).await?))
}

/// Projects belonging to a client, newest first
#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/projects",
    params(("id" = Uuid, Path, description = "Client id")),
    responses((status = 200, description = "Projects", body = ApiResponse<Vec<project::Model>>)),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn client_projects(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<project::Model>>>, ServiceError> {
    Ok(ok(state.services.clients.client_projects(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/clients",
    request_body = CreateClientInput,
    responses(
        (status = 201, description = "Client created", body = ApiResponse<client::Model>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn create_client(
    State(state): State<AppState>,
    Json(input): Json<CreateClientInput>,
) -> Result<(StatusCode, Json<ApiResponse<client::Model>>), ServiceError> {
    Ok(created(state.services.clients.create_client(input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/clients/{id}",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = UpdateClientInput,
    responses((status = 200, description = "Client updated", body = ApiResponse<client::Model>)),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateClientInput>,
) -> Result<Json<ApiResponse<client::Model>>, ServiceError> {
    Ok(ok(state.services.clients.update_client(id, input).await?))
}

/// Delete a client without projects
#[utoipa::path(
    delete,
    path = "/api/v1/clients/{id}",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 204, description = "Client deleted"),
        (status = 409, description = "Client has projects", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "clients"
)]
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.clients.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
