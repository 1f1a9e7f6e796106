//! Project file storage. Bytes live under `upload_dir` with generated names;
//! the database keeps the metadata and the sanitized original name.

use bytes::Bytes;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{
        project::Entity as ProjectEntity,
        upload::{self, Entity as UploadEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const MAX_NAME_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl UploadSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            dir: PathBuf::from(&cfg.upload_dir),
            max_bytes: cfg.max_upload_bytes,
            allowed_types: cfg.upload_content_types(),
        }
    }

    /// Whether a content type is accepted; `type/*` entries match a whole family.
    pub fn accepts(&self, content_type: &str) -> bool {
        let essence = essence(content_type);
        self.allowed_types.iter().any(|allowed| match allowed.strip_suffix("/*") {
            Some(family) => essence
                .split_once('/')
                .map_or(false, |(top, _)| top == family),
            None => *allowed == essence,
        })
    }
}

/// `text/csv; charset=utf-8` → `text/csv`
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Strips directories, control characters and reserved punctuation from a
/// client-supplied file name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?'))
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end()
        .to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn stored_name_for(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}{}", Uuid::new_v4(), ext)
}

/// A file received from a client, before it is stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct UploadService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    settings: Arc<UploadSettings>,
}

impl UploadService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, settings: UploadSettings) -> Self {
        Self {
            db,
            event_sender,
            settings: Arc::new(settings),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.settings.max_bytes
    }

    fn path_for(&self, stored_name: &str) -> PathBuf {
        self.settings.dir.join(stored_name)
    }

    #[instrument(skip(self, file), fields(name = %file.original_name, size = file.data.len()))]
    pub async fn store(
        &self,
        project_id: Uuid,
        file: IncomingFile,
        uploaded_by: Option<Uuid>,
    ) -> Result<upload::Model, ServiceError> {
        ProjectEntity::find_by_id(project_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))?;

        if file.data.len() > self.settings.max_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                self.settings.max_bytes
            )));
        }
        if file.data.is_empty() {
            return Err(ServiceError::ValidationError("File is empty".into()));
        }
        if !self.settings.accepts(&file.content_type) {
            return Err(ServiceError::UnsupportedMediaType(format!(
                "Content type '{}' is not accepted",
                essence(&file.content_type)
            )));
        }

        let original_name = sanitize_filename(&file.original_name);
        let stored_name = stored_name_for(&original_name);
        let path = self.path_for(&stored_name);

        fs::create_dir_all(&self.settings.dir).await?;
        fs::write(&path, &file.data).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to write upload");
            ServiceError::from(e)
        })?;

        let saved = upload::ActiveModel {
            project_id: Set(Some(project_id)),
            original_name: Set(original_name),
            stored_name: Set(stored_name),
            content_type: Set(essence(&file.content_type)),
            size_bytes: Set(file.data.len() as i64),
            uploaded_by: Set(uploaded_by),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        let saved = match saved {
            Ok(model) => model,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "Failed to clean up orphaned upload");
                }
                return Err(ServiceError::db_error(e));
            }
        };

        info!(upload_id = %saved.id, %project_id, "Upload stored");
        self.event_sender
            .send_or_log(Event::UploadStored {
                upload_id: saved.id,
                project_id: saved.project_id,
            })
            .await;
        Ok(saved)
    }

    pub async fn list_for_project(&self, project_id: Uuid) -> Result<Vec<upload::Model>, ServiceError> {
        ProjectEntity::find_by_id(project_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))?;

        UploadEntity::find()
            .filter(upload::Column::ProjectId.eq(project_id))
            .order_by_desc(upload::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_upload(&self, id: Uuid) -> Result<upload::Model, ServiceError> {
        UploadEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Upload", id))
    }

    /// Metadata plus the stored bytes.
    #[instrument(skip(self))]
    pub async fn read(&self, id: Uuid) -> Result<(upload::Model, Bytes), ServiceError> {
        let meta = self.get_upload(id).await?;
        let data = match fs::read(self.path_for(&meta.stored_name)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(upload_id = %id, "Upload row has no file on disk");
                return Err(ServiceError::not_found("Upload file", id));
            }
            Err(e) => return Err(e.into()),
        };
        Ok((meta, Bytes::from(data)))
    }

    /// Removes the row, then the file. A file that is already gone is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let meta = self.get_upload(id).await?;
        UploadEntity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let path = self.path_for(&meta.stored_name);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Upload file already missing");
            }
            Err(e) => return Err(e.into()),
        }

        info!(upload_id = %id, "Upload deleted");
        self.event_sender.send_or_log(Event::UploadDeleted(id)).await;
        Ok(())
    }
}
