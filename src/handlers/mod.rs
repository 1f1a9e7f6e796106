pub mod assemblies;
pub mod assembly_categories;
pub mod assembly_groups;
pub mod auth;
pub mod clients;
pub mod common;
pub mod materials;
pub mod notifications;
pub mod projects;
pub mod templates;
pub mod timelines;
pub mod uploads;
pub mod users;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::notifications::MessageSender;
use crate::services::{
    assemblies::AssemblyService, assembly_categories::AssemblyCategoryService,
    assembly_groups::AssemblyGroupService, clients::ClientService, materials::MaterialService,
    notifications::NotificationService, projects::ProjectService, templates::TemplateService,
    timelines::TimelineService,
    uploads::{UploadService, UploadSettings},
    users::UserService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub materials: Arc<MaterialService>,
    pub assembly_categories: Arc<AssemblyCategoryService>,
    pub assemblies: Arc<AssemblyService>,
    pub assembly_groups: Arc<AssemblyGroupService>,
    pub templates: Arc<TemplateService>,
    pub clients: Arc<ClientService>,
    pub projects: Arc<ProjectService>,
    pub timelines: Arc<TimelineService>,
    pub uploads: Arc<UploadService>,
    pub notifications: Arc<NotificationService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
        message_sender: Arc<dyn MessageSender>,
    ) -> Self {
        let currency = config.currency.clone();
        Self {
            materials: Arc::new(MaterialService::new(db.clone(), event_sender.clone())),
            assembly_categories: Arc::new(AssemblyCategoryService::new(db.clone())),
            assemblies: Arc::new(AssemblyService::new(db.clone(), event_sender.clone())),
            assembly_groups: Arc::new(AssemblyGroupService::new(db.clone())),
            templates: Arc::new(TemplateService::new(
                db.clone(),
                event_sender.clone(),
                currency.clone(),
            )),
            clients: Arc::new(ClientService::new(db.clone(), event_sender.clone())),
            projects: Arc::new(ProjectService::new(
                db.clone(),
                event_sender.clone(),
                currency,
            )),
            timelines: Arc::new(TimelineService::new(db.clone(), event_sender.clone())),
            uploads: Arc::new(UploadService::new(
                db.clone(),
                event_sender.clone(),
                UploadSettings::from_config(config),
            )),
            notifications: Arc::new(NotificationService::new(
                db.clone(),
                event_sender,
                message_sender,
            )),
            users: Arc::new(UserService::new(db)),
        }
    }
}
