use axum::{
    extract::{multipart::MultipartError, Json, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use tracing::warn;
use uuid::Uuid;

use super::common::{created, ok};
use crate::{
    auth::AuthUser,
    entities::upload,
    errors::ServiceError,
    services::uploads::IncomingFile,
    ApiResponse, AppState,
};

const FILE_FIELD: &str = "file";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/uploads", get(list_uploads))
        .route("/uploads/:id", get(download_upload))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/uploads", post(upload_file))
        .route("/uploads/:id", delete(delete_upload))
}

fn multipart_error(err: MultipartError) -> ServiceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge("Upload exceeds the allowed size".into())
    } else {
        ServiceError::BadRequest(err.body_text())
    }
}

/// Pulls the `file` part out of a multipart body.
async fn read_file_field(multipart: &mut Multipart) -> Result<IncomingFile, ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(IncomingFile {
            original_name,
            content_type,
            data,
        });
    }
    Err(ServiceError::ValidationError(format!(
        "multipart field '{}' is required",
        FILE_FIELD
    )))
}

/// Attach a file to a project
#[utoipa::path(
    post,
    path = "/api/v1/projects/{id}/uploads",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body(content = String, description = "Multipart form with a `file` part", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "File stored", body = ApiResponse<upload::Model>),
        (status = 413, description = "File too large", body = crate::errors::ErrorResponse),
        (status = 415, description = "Content type not accepted", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "uploads"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<upload::Model>>), ServiceError> {
    let file = read_file_field(&mut multipart).await?;
    let stored = state
        .services
        .uploads
        .store(project_id, file, Some(user.user_id))
        .await?;
    Ok(created(stored))
}

#[utoipa::path(
    get,
    path = "/api/v1/projects/{id}/uploads",
    params(("id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Uploads, newest first", body = ApiResponse<Vec<upload::Model>>)),
    security(("Bearer" = [])),
    tag = "uploads"
)]
pub async fn list_uploads(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<upload::Model>>>, ServiceError> {
    Ok(ok(state.services.uploads.list_for_project(project_id).await?))
}

/// Download the stored bytes under their original name
#[utoipa::path(
    get,
    path = "/api/v1/uploads/{id}",
    params(("id" = Uuid, Path, description = "Upload id")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "uploads"
)]
pub async fn download_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let (meta, data) = state.services.uploads.read(id).await?;

    let content_type = HeaderValue::from_str(&meta.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        meta.original_name.replace('"', "")
    ))
    .unwrap_or_else(|e| {
        warn!(upload_id = %id, error = %e, "original name not usable in header");
        HeaderValue::from_static("attachment")
    });

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/uploads/{id}",
    params(("id" = Uuid, Path, description = "Upload id")),
    responses((status = 204, description = "Upload deleted")),
    security(("Bearer" = [])),
    tag = "uploads"
)]
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.uploads.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
