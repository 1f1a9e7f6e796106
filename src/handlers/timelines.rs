use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created, ok};
use crate::{
    entities::{project_milestone, project_task},
    errors::ServiceError,
    services::timelines::{
        CreateMilestoneInput, CreateTaskInput, ProjectTimeline, UpdateMilestoneInput,
        UpdateTaskInput,
    },
    ApiResponse, AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/projects/:id/timeline", get(get_timeline))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/milestones", post(add_milestone))
        .route(
            "/projects/:id/milestones/:milestone_id",
            put(update_milestone).delete(delete_milestone),
        )
        .route("/projects/:id/tasks", post(add_task))
        .route(
            "/projects/:id/tasks/:task_id",
            put(update_task).delete(delete_task),
        )
}

/// Milestones with their tasks and progress
#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/timeline",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Timeline", body = ApiResponse<ProjectTimeline>),
        (status = 404, description = "Project not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProjectTimeline>>, ServiceError> {
    Ok(ok(state.services.timelines.timeline(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/milestones",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = CreateMilestoneInput,
    responses((status = 201, description = "Milestone added", body = ApiResponse<project_milestone::Model>)),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn add_milestone(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateMilestoneInput>,
) -> Result<(StatusCode, Json<ApiResponse<project_milestone::Model>>), ServiceError> {
    Ok(created(state.services.timelines.add_milestone(id, input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/{id}/milestones/{milestone_id}",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("milestone_id" = Uuid, Path, description = "Milestone id"),
    ),
    request_body = UpdateMilestoneInput,
    responses(
        (status = 200, description = "Milestone updated", body = ApiResponse<project_milestone::Model>),
        (status = 400, description = "Milestone still has open tasks", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn update_milestone(
    State(state): State<AppState>,
    Path((id, milestone_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateMilestoneInput>,
) -> Result<Json<ApiResponse<project_milestone::Model>>, ServiceError> {
    Ok(ok(state
        .services
        .timelines
        .update_milestone(id, milestone_id, input)
        .await?))
}

/// Delete a milestone together with its tasks
#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}/milestones/{milestone_id}",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("milestone_id" = Uuid, Path, description = "Milestone id"),
    ),
    responses((status = 204, description = "Milestone deleted")),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn delete_milestone(
    State(state): State<AppState>,
    Path((id, milestone_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .timelines
        .delete_milestone(id, milestone_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = CreateTaskInput,
    responses((status = 201, description = "Task added", body = ApiResponse<project_task::Model>)),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn add_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateTaskInput>,
) -> Result<(StatusCode, Json<ApiResponse<project_task::Model>>), ServiceError> {
    Ok(created(state.services.timelines.add_task(id, input).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/projects/{id}/tasks/{task_id}",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id"),
    ),
    request_body = UpdateTaskInput,
    responses((status = 200, description = "Task updated", body = ApiResponse<project_task::Model>)),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn update_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateTaskInput>,
) -> Result<Json<ApiResponse<project_task::Model>>, ServiceError> {
    Ok(ok(state
        .services
        .timelines
        .update_task(id, task_id, input)
        .await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/projects/{id}/tasks/{task_id}",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id"),
    ),
    responses((status = 204, description = "Task deleted")),
    security(("Bearer" = [])),
    tag = "timelines"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state.services.timelines.delete_task(id, task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
