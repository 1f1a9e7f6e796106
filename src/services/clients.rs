use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{clean, ilike, page_index};
use crate::{
    entities::{
        client::{self, Entity as ClientEntity},
        project::{self, Entity as ProjectEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::normalize_phone,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateClientInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub whatsapp_opt_in: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateClientInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub whatsapp_opt_in: Option<bool>,
}

/// Client records and their project listings
#[derive(Clone)]
pub struct ClientService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

fn normalize_optional_phone(phone: Option<String>) -> Result<Option<String>, ServiceError> {
    clean(phone).map(|p| normalize_phone(&p)).transpose()
}

impl ClientService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_client(&self, input: CreateClientInput) -> Result<client::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let created = client::ActiveModel {
            name: Set(input.name.trim().to_string()),
            email: Set(clean(input.email).map(|e| e.to_lowercase())),
            phone: Set(normalize_optional_phone(input.phone)?),
            company: Set(clean(input.company)),
            address: Set(clean(input.address)),
            notes: Set(clean(input.notes)),
            whatsapp_opt_in: Set(input.whatsapp_opt_in),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!("Failed to create client: {}", e);
            ServiceError::db_error(e)
        })?;

        self.event_sender
            .send_or_log(Event::ClientCreated(created.id))
            .await;
        info!(client_id = %created.id, "Client created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_client(&self, id: Uuid) -> Result<client::Model, ServiceError> {
        ClientEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Client", id))
    }

    /// Lists clients by name, optionally filtered by a case-insensitive
    /// search on name, company or email.
    #[instrument(skip(self))]
    pub async fn list_clients(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<(Vec<client::Model>, u64), ServiceError> {
        let mut query = ClientEntity::find();
        if let Some(term) = clean(search) {
            query = query.filter(
                ilike(client::Column::Name, &term)
                    .or(ilike(client::Column::Company, &term))
                    .or(ilike(client::Column::Email, &term)),
            );
        }

        let paginator = query
            .order_by_asc(client::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Database error when counting clients");
            ServiceError::db_error(e)
        })?;
        let clients = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((clients, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_client(
        &self,
        id: Uuid,
        input: UpdateClientInput,
    ) -> Result<client::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_client(id).await?;
        let mut active: client::ActiveModel = existing.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.email.is_some() {
            active.email = Set(clean(input.email).map(|e| e.to_lowercase()));
        }
        if input.phone.is_some() {
            active.phone = Set(normalize_optional_phone(input.phone)?);
        }
        if input.company.is_some() {
            active.company = Set(clean(input.company));
        }
        if input.address.is_some() {
            active.address = Set(clean(input.address));
        }
        if input.notes.is_some() {
            active.notes = Set(clean(input.notes));
        }
        if let Some(opt_in) = input.whatsapp_opt_in {
            active.whatsapp_opt_in = Set(opt_in);
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(client_id = %id, "Failed to update client: {}", e);
            ServiceError::db_error(e)
        })?;
        info!(client_id = %id, "Client updated");
        Ok(updated)
    }

    /// Deletes a client that has no projects.
    #[instrument(skip(self))]
    pub async fn delete_client(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        let client = self.get_client(id).await?;

        let projects = ProjectEntity::find()
            .filter(project::Column::ClientId.eq(id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if projects > 0 {
            return Err(ServiceError::Conflict(format!(
                "Client {} still has {} project(s)",
                id, projects
            )));
        }

        ClientEntity::delete_by_id(client.id)
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender.send_or_log(Event::ClientDeleted(id)).await;
        info!(client_id = %id, "Client deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn client_projects(&self, id: Uuid) -> Result<Vec<project::Model>, ServiceError> {
        self.get_client(id).await?;
        ProjectEntity::find()
            .filter(project::Column::ClientId.eq(id))
            .order_by_desc(project::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use assert_matches::assert_matches;

    fn input(name: &str) -> CreateClientInput {
        CreateClientInput {
            name: name.into(),
            email: Some("Owner@Example.com".into()),
            phone: Some("+1 (555) 123-4567".into()),
            company: None,
            address: None,
            notes: Some("  ".into()),
            whatsapp_opt_in: true,
        }
    }

    #[tokio::test]
    async fn create_normalizes_contact_fields() {
        let (events, mut rx) = test_support::events();
        let service = ClientService::new(test_support::db().await, events);

        let client = service.create_client(input("Harbor Homes")).await.unwrap();
        assert_eq!(client.phone.as_deref(), Some("+15551234567"));
        assert_eq!(client.email.as_deref(), Some("owner@example.com"));
        assert_eq!(client.notes, None);
        assert_matches!(rx.try_recv(), Ok(Event::ClientCreated(id)) if id == client.id);
    }

    #[tokio::test]
    async fn invalid_phone_is_rejected() {
        let (events, _rx) = test_support::events();
        let service = ClientService::new(test_support::db().await, events);

        let mut bad = input("Bad phone");
        bad.phone = Some("12".into());
        assert_matches!(
            service.create_client(bad).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let (events, _rx) = test_support::events();
        let service = ClientService::new(test_support::db().await, events);
        service.create_client(input("Harbor Homes")).await.unwrap();
        service.create_client(input("Summit Builders")).await.unwrap();

        let (found, total) = service
            .list_clients(1, 20, Some("HARBOR".into()))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].name, "Harbor Homes");
    }

    #[tokio::test]
    async fn update_keeps_untouched_fields() {
        let (events, _rx) = test_support::events();
        let service = ClientService::new(test_support::db().await, events);
        let client = service.create_client(input("Harbor Homes")).await.unwrap();

        let updated = service
            .update_client(
                client.id,
                UpdateClientInput {
                    company: Some("Harbor Holdings".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.company.as_deref(), Some("Harbor Holdings"));
        assert_eq!(updated.phone, client.phone);
    }

    #[tokio::test]
    async fn delete_missing_client_is_not_found() {
        let (events, _rx) = test_support::events();
        let service = ClientService::new(test_support::db().await, events);
        assert_matches!(
            service.delete_client(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
