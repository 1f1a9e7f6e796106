use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok, SearchParams};
use crate::{
    entities::assembly_group,
    errors::ServiceError,
    services::assembly_groups::{
        CreateGroupInput, GroupDetail, GroupItemInput, UpdateGroupInput, UpdateGroupItemInput,
    },
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/assembly-groups", get(list_groups))
        .route("/assembly-groups/:id", get(get_group))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/assembly-groups", post(create_group))
        .route("/assembly-groups/:id", put(update_group).delete(delete_group))
        .route("/assembly-groups/:id/items", post(add_item))
        .route(
            "/assembly-groups/:id/items/:item_id",
            put(update_item).delete(remove_item),
        )
}

/// List assembly groups, optionally within one category
#[utoipa::path(
    get,
    path = "/api/v1/assembly-groups",
    params(SearchParams),
    responses((status = 200, description = "Groups", body = ApiResponse<Vec<assembly_group::Model>>)),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(filter): Query<SearchParams>,
) -> Result<Json<ApiResponse<Vec<assembly_group::Model>>>, ServiceError> {
    Ok(ok(state
        .services
        .assembly_groups
        .list_groups(filter.category_id)
        .await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly-groups/{id}",
    params(("id" = Uuid, Path, description = "Group id")),
    responses(
        (status = 200, description = "Group with its items", body = ApiResponse<GroupDetail>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GroupDetail>>, ServiceError> {
    Ok(ok(state.services.assembly_groups.get_group(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly-groups",
    request_body = CreateGroupInput,
    responses(
        (status = 201, description = "Group created", body = ApiResponse<GroupDetail>),
        (status = 400, description = "Invalid items", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn create_group(
    State(state): State<AppState>,
    Json(input): Json<CreateGroupInput>,
) -> Result<(StatusCode, Json<ApiResponse<GroupDetail>>), ServiceError> {
    Ok(created(state.services.assembly_groups.create_group(input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/assembly-groups/{id}",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = UpdateGroupInput,
    responses((status = 200, description = "Group updated", body = ApiResponse<GroupDetail>)),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateGroupInput>,
) -> Result<Json<ApiResponse<GroupDetail>>, ServiceError> {
    Ok(ok(state.services.assembly_groups.update_group(id, input).await?))
}

/// Delete a group that no template references
#[utoipa::path(
    delete,
    path = "/api/v1/assembly-groups/{id}",
    params(("id" = Uuid, Path, description = "Group id")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 409, description = "Group is attached to templates", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.assembly_groups.delete_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly-groups/{id}/items",
    params(("id" = Uuid, Path, description = "Group id")),
    request_body = GroupItemInput,
    responses(
        (status = 201, description = "Item added", body = ApiResponse<GroupDetail>),
        (status = 409, description = "Assembly already in group", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<GroupItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<GroupDetail>>), ServiceError> {
    Ok(created(state.services.assembly_groups.add_item(id, input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/assembly-groups/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Group id"),
        ("item_id" = Uuid, Path, description = "Item id"),
    ),
    request_body = UpdateGroupItemInput,
    responses((status = 200, description = "Item updated", body = ApiResponse<GroupDetail>)),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateGroupItemInput>,
) -> Result<Json<ApiResponse<GroupDetail>>, ServiceError> {
    Ok(ok(state
        .services
        .assembly_groups
        .update_item(id, item_id, input)
        .await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/assembly-groups/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Group id"),
        ("item_id" = Uuid, Path, description = "Item id"),
    ),
    responses((status = 204, description = "Item removed")),
    security(("Bearer" = [])),
    tag = "assembly-groups"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .assembly_groups
        .remove_item(id, item_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
