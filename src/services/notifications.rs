//! Recorded WhatsApp messages: sending, listing, webhook status updates and
//! the event handler that messages clients about their projects.

use async_trait::async_trait;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::page_index;
use crate::{
    entities::{
        client::{self, Entity as ClientEntity},
        notification::{self, Entity as NotificationEntity, NotificationStatus},
        project::{Entity as ProjectEntity, ProjectStatus},
    },
    errors::ServiceError,
    events::{Event, EventHandler, EventSender},
    notifications::{normalize_phone, whatsapp::StatusUpdate, MessageSender},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendWhatsAppInput {
    /// Client to message; takes precedence over `recipient`
    pub client_id: Option<Uuid>,
    /// Raw phone number, for recipients that are not clients
    pub recipient: Option<String>,
    pub project_id: Option<Uuid>,
    #[validate(length(min = 1, max = 4096))]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationFilter {
    pub project_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<NotificationStatus>,
}

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    sender: Arc<dyn MessageSender>,
}

impl NotificationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            db,
            event_sender,
            sender,
        }
    }

    async fn client_recipient(&self, client_id: Uuid) -> Result<String, ServiceError> {
        let client = ClientEntity::find_by_id(client_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Client", client_id))?;
        if client.phone.is_none() {
            return Err(ServiceError::BadRequest(format!(
                "Client {} has no phone number",
                client_id
            )));
        }
        client
            .whatsapp_recipient()
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Client {} has not opted in to WhatsApp messages",
                    client_id
                ))
            })
    }

    /// Sends a message and records it. A provider failure is recorded on the
    /// notification before the error is returned.
    #[instrument(skip(self, input), fields(client_id = ?input.client_id))]
    pub async fn send_whatsapp(
        &self,
        input: SendWhatsAppInput,
    ) -> Result<notification::Model, ServiceError> {
        input.validate()?;
        let recipient = match (input.client_id, input.recipient.as_deref()) {
            (Some(client_id), _) => self.client_recipient(client_id).await?,
            (None, Some(raw)) => normalize_phone(raw)?,
            (None, None) => {
                return Err(ServiceError::ValidationError(
                    "Either client_id or recipient is required".into(),
                ))
            }
        };
        if let Some(project_id) = input.project_id {
            ProjectEntity::find_by_id(project_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::not_found("Project", project_id))?;
        }

        self.deliver(input.client_id, input.project_id, recipient, input.message)
            .await
    }

    async fn deliver(
        &self,
        client_id: Option<Uuid>,
        project_id: Option<Uuid>,
        recipient: String,
        message: String,
    ) -> Result<notification::Model, ServiceError> {
        let queued = notification::ActiveModel {
            client_id: Set(client_id),
            project_id: Set(project_id),
            recipient: Set(recipient.clone()),
            message: Set(message.clone()),
            status: Set(NotificationStatus::Queued),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to record notification: {}", e);
            ServiceError::db_error(e)
        })?;
        let notification_id = queued.id;

        let outcome = self.sender.send_text(&recipient, &message).await;
        let mut active: notification::ActiveModel = queued.into();
        match outcome {
            Ok(receipt) => {
                active.status = Set(NotificationStatus::Sent);
                active.provider_message_id = Set(receipt.provider_message_id);
                let sent = active.update(&*self.db).await.map_err(ServiceError::db_error)?;
                info!(%notification_id, channel = self.sender.channel(), "Notification sent");
                counter!("bomflow.notifications.sent", 1);
                self.event_sender
                    .send_or_log(Event::NotificationSent(notification_id))
                    .await;
                Ok(sent)
            }
            Err(e) => {
                warn!(%notification_id, error = %e, "Notification delivery failed");
                counter!("bomflow.notifications.failed", 1);
                active.status = Set(NotificationStatus::Failed);
                active.error = Set(Some(e.to_string()));
                active.update(&*self.db).await.map_err(ServiceError::db_error)?;
                self.event_sender
                    .send_or_log(Event::NotificationFailed {
                        notification_id,
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<notification::Model, ServiceError> {
        NotificationEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Notification", id))
    }

    #[instrument(skip(self))]
    pub async fn list_notifications(
        &self,
        page: u64,
        per_page: u64,
        filter: NotificationFilter,
    ) -> Result<(Vec<notification::Model>, u64), ServiceError> {
        let mut query = NotificationEntity::find();
        if let Some(project_id) = filter.project_id {
            query = query.filter(notification::Column::ProjectId.eq(project_id));
        }
        if let Some(client_id) = filter.client_id {
            query = query.filter(notification::Column::ClientId.eq(client_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(notification::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(notification::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Applies webhook delivery updates. Statuses only move forward; unknown
    /// message ids are ignored. Returns how many notifications changed.
    #[instrument(skip(self, updates), fields(count = updates.len()))]
    pub async fn apply_status_updates(&self, updates: &[StatusUpdate]) -> Result<usize, ServiceError> {
        let mut changed = 0;
        for update in updates {
            let Some(next) = update.notification_status() else {
                debug!(status = %update.status, "ignoring unknown delivery status");
                continue;
            };
            let Some(existing) = NotificationEntity::find()
                .filter(notification::Column::ProviderMessageId.eq(update.id.as_str()))
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
            else {
                debug!(provider_message_id = %update.id, "status for unknown message");
                continue;
            };
            if next.rank() <= existing.status.rank() {
                continue;
            }

            let mut active: notification::ActiveModel = existing.into();
            active.status = Set(next);
            if next == NotificationStatus::Failed {
                active.error = Set(update.error_summary());
            }
            active.update(&*self.db).await.map_err(ServiceError::db_error)?;
            changed += 1;
        }
        Ok(changed)
    }

    /// Messages a project's client when they opted in; `None` when there is
    /// nobody to tell.
    pub async fn notify_project_client(
        &self,
        project_id: Uuid,
        message: impl Fn(&str) -> String,
    ) -> Result<Option<notification::Model>, ServiceError> {
        let Some((project, Some(client))) = ProjectEntity::find_by_id(project_id)
            .find_also_related(ClientEntity)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };
        let Some(recipient) = client.whatsapp_recipient().map(str::to_string) else {
            debug!(%project_id, client_id = %client.id, "client not reachable on WhatsApp");
            return Ok(None);
        };

        self.deliver(
            Some(client.id),
            Some(project_id),
            recipient,
            message(&project.name),
        )
        .await
        .map(Some)
    }
}

fn status_phrase(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Draft => "back in draft",
        ProjectStatus::Active => "now active",
        ProjectStatus::OnHold => "on hold",
        ProjectStatus::Completed => "completed",
        ProjectStatus::Cancelled => "cancelled",
    }
}

/// Sends WhatsApp updates to opted-in clients on project events.
pub struct ProjectNotifier {
    notifications: NotificationService,
}

impl ProjectNotifier {
    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl EventHandler for ProjectNotifier {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        let result = match event {
            Event::ProjectStatusChanged { project_id, to, .. } => {
                let phrase = status_phrase(*to);
                self.notifications
                    .notify_project_client(*project_id, |name| {
                        format!("Your project \"{}\" is {}.", name, phrase)
                    })
                    .await
            }
            Event::MilestoneCompleted {
                project_id, title, ..
            } => {
                self.notifications
                    .notify_project_client(*project_id, |name| {
                        format!("Milestone \"{}\" of your project \"{}\" is complete.", title, name)
                    })
                    .await
            }
            _ => return Ok(()),
        };
        result.map(|_| ()).map_err(|e| e.to_string())
    }
}
