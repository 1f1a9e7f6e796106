use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::project::ProjectStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the processor is gone.
    /// Domain writes have already committed by the time events go out.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

// Domain events emitted after successful writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ClientCreated(Uuid),
    ClientDeleted(Uuid),

    MaterialPriceChanged {
        material_id: Uuid,
        old_price: Decimal,
        new_price: Decimal,
    },

    AssemblyChanged(Uuid),
    TemplateChanged(Uuid),

    ProjectCreated {
        project_id: Uuid,
        client_id: Uuid,
        template_id: Option<Uuid>,
    },
    ProjectStatusChanged {
        project_id: Uuid,
        from: ProjectStatus,
        to: ProjectStatus,
    },
    ProjectRepriced {
        project_id: Uuid,
        old_total: Decimal,
        new_total: Decimal,
    },

    MilestoneCompleted {
        project_id: Uuid,
        milestone_id: Uuid,
        title: String,
    },
    MilestoneReopened {
        project_id: Uuid,
        milestone_id: Uuid,
    },

    UploadStored {
        upload_id: Uuid,
        project_id: Option<Uuid>,
    },
    UploadDeleted(Uuid),

    NotificationSent(Uuid),
    NotificationFailed {
        notification_id: Uuid,
        error: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ClientCreated(_) => "client_created",
            Event::ClientDeleted(_) => "client_deleted",
            Event::MaterialPriceChanged { .. } => "material_price_changed",
            Event::AssemblyChanged(_) => "assembly_changed",
            Event::TemplateChanged(_) => "template_changed",
            Event::ProjectCreated { .. } => "project_created",
            Event::ProjectStatusChanged { .. } => "project_status_changed",
            Event::ProjectRepriced { .. } => "project_repriced",
            Event::MilestoneCompleted { .. } => "milestone_completed",
            Event::MilestoneReopened { .. } => "milestone_reopened",
            Event::UploadStored { .. } => "upload_stored",
            Event::UploadDeleted(_) => "upload_deleted",
            Event::NotificationSent(_) => "notification_sent",
            Event::NotificationFailed { .. } => "notification_failed",
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Drains the event channel, logging every event and fanning it out to the
/// registered handlers. A failing handler never stops the loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!(handlers = handlers.len(), "Starting event processing loop");

    while let Some(event) = rx.recv().await {
        log_event(&event);

        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), error = %e, "event handler failed");
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}

fn log_event(event: &Event) {
    match event {
        Event::MaterialPriceChanged {
            material_id,
            old_price,
            new_price,
        } => info!(
            %material_id, %old_price, %new_price,
            "material price changed; templates using it price differently from now on"
        ),
        Event::ProjectStatusChanged {
            project_id,
            from,
            to,
        } => info!(%project_id, %from, %to, "project status changed"),
        Event::ProjectRepriced {
            project_id,
            old_total,
            new_total,
        } => info!(%project_id, %old_total, %new_total, "project repriced"),
        Event::NotificationFailed {
            notification_id,
            error,
        } => warn!(%notification_id, %error, "notification delivery failed"),
        other => debug!(event = other.name(), payload = ?other, "domain event"),
    }
}
