use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::pricing::{self, PriceBreakdown, TakeoffLine};
use super::templates::load_template_lines;
use super::timelines::seed_default_milestones;
use super::{clean, ilike, page_index, MAX_STORED_AMOUNT};
use crate::{
    entities::{
        client::Entity as ClientEntity,
        project::{self, Entity as ProjectEntity, ProjectStatus},
        project_milestone::{self, Entity as MilestoneEntity},
        project_task::{self, Entity as TaskEntity},
        template::Entity as TemplateEntity,
        upload::{self, Entity as UploadEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create_dates"))]
pub struct CreateProjectInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub client_id: Uuid,
    pub template_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10000))]
    pub quantity: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub site_address: Option<String>,
    pub notes: Option<String>,
    /// Adds the Planning, Procurement, Build and Handover milestones
    #[serde(default)]
    pub seed_timeline: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub site_address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangeStatusInput {
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub client_id: Option<Uuid>,
    /// Case-insensitive match on the project name
    pub search: Option<String>,
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => {
            let mut err = ValidationError::new("date_order");
            err.message = Some("end_date must not precede start_date".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

fn validate_create_dates(input: &CreateProjectInput) -> Result<(), ValidationError> {
    check_dates(input.start_date, input.end_date)
}

#[derive(Clone)]
pub struct ProjectService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    currency: String,
}

impl ProjectService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, currency: String) -> Self {
        Self {
            db,
            event_sender,
            currency,
        }
    }

    /// Full price breakdown of a template scaled to `quantity`.
    async fn template_price(
        &self,
        template_id: Uuid,
        quantity: i32,
    ) -> Result<PriceBreakdown, ServiceError> {
        let template = TemplateEntity::find_by_id(template_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Template", template_id))?;
        let lines = load_template_lines(&*self.db, template_id).await?;
        pricing::price_template(
            &lines,
            template.markup_percent,
            quantity,
            &self.currency,
        )
    }

    /// Template total at `quantity`, checked against what the snapshot
    /// column can hold.
    async fn snapshot_total(&self, template_id: Uuid, quantity: i32) -> Result<Decimal, ServiceError> {
        let total = self.snapshot_total(template_id, quantity).await?;
        if total > MAX_STORED_AMOUNT {
            return Err(ServiceError::InvalidOperation(format!(
                "Project total {} exceeds the largest storable price",
                total
            )));
        }
        Ok(total)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_project(&self, input: CreateProjectInput) -> Result<project::Model, ServiceError> {
        input.validate()?;

        ClientEntity::find_by_id(input.client_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Client {} does not exist", input.client_id))
            })?;

        let total_price = match input.template_id {
            Some(template_id) => {
                let exists = TemplateEntity::find_by_id(template_id)
                    .one(&*self.db)
                    .await
                    .map_err(ServiceError::db_error)?
                    .is_some();
                if !exists {
                    return Err(ServiceError::ValidationError(format!(
                        "Template {} does not exist",
                        template_id
                    )));
                }
                self.snapshot_total(template_id, input.quantity).await?
            }
            None => Decimal::ZERO,
        };

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let created = project::ActiveModel {
            name: Set(input.name.trim().to_string()),
            client_id: Set(input.client_id),
            template_id: Set(input.template_id),
            status: Set(ProjectStatus::Draft),
            quantity: Set(input.quantity),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            site_address: Set(clean(input.site_address)),
            notes: Set(clean(input.notes)),
            total_price: Set(total_price),
            currency: Set(self.currency.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!("Failed to create project: {}", e);
            ServiceError::db_error(e)
        })?;
        if input.seed_timeline {
            seed_default_milestones(&txn, created.id).await?;
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(project_id = %created.id, total = %created.total_price, "Project created");
        self.event_sender
            .send_or_log(Event::ProjectCreated {
                project_id: created.id,
                client_id: created.client_id,
                template_id: created.template_id,
            })
            .await;
        Ok(created)
    }

    pub async fn get_project(&self, id: Uuid) -> Result<project::Model, ServiceError> {
        ProjectEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project", id))
    }

    #[instrument(skip(self))]
    pub async fn list_projects(
        &self,
        page: u64,
        per_page: u64,
        filter: ProjectFilter,
    ) -> Result<(Vec<project::Model>, u64), ServiceError> {
        let mut query = ProjectEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(project::Column::Status.eq(status));
        }
        if let Some(client_id) = filter.client_id {
            query = query.filter(project::Column::ClientId.eq(client_id));
        }
        if let Some(term) = clean(filter.search) {
            query = query.filter(ilike(project::Column::Name, &term));
        }

        let paginator = query
            .order_by_desc(project::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Database error when counting projects");
            ServiceError::db_error(e)
        })?;
        let projects = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((projects, total))
    }

    /// Updates project details. A quantity change reprices from current
    /// catalog prices.
    #[instrument(skip(self, input))]
    pub async fn update_project(
        &self,
        id: Uuid,
        input: UpdateProjectInput,
    ) -> Result<project::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_project(id).await?;

        let start = input.start_date.or(existing.start_date);
        let end = input.end_date.or(existing.end_date);
        check_dates(start, end).map_err(|e| {
            ServiceError::ValidationError(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid dates".into()),
            )
        })?;

        let requantified = input.quantity.filter(|q| *q != existing.quantity);
        if requantified.is_some() && existing.status.is_final() {
            return Err(ServiceError::InvalidOperation(format!(
                "Project is {} and its quantity can no longer change",
                existing.status
            )));
        }
        let requantified = requantified.map(|q| (q, existing.template_id));
        let old_total = existing.total_price;

        let mut active: project::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.start_date.is_some() {
            active.start_date = Set(input.start_date);
        }
        if input.end_date.is_some() {
            active.end_date = Set(input.end_date);
        }
        if input.site_address.is_some() {
            active.site_address = Set(clean(input.site_address));
        }
        if input.notes.is_some() {
            active.notes = Set(clean(input.notes));
        }
        let mut repriced = None;
        if let Some((quantity, template_id)) = requantified {
            active.quantity = Set(quantity);
            if let Some(template_id) = template_id {
                let total = self.snapshot_total(template_id, quantity).await?;
                active.total_price = Set(total);
                repriced = Some(total);
            }
        }
        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        if let Some(new_total) = repriced {
            self.event_sender
                .send_or_log(Event::ProjectRepriced {
                    project_id: id,
                    old_total,
                    new_total,
                })
                .await;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        id: Uuid,
        next: ProjectStatus,
    ) -> Result<project::Model, ServiceError> {
        let existing = self.get_project(id).await?;
        let from = existing.status;
        if !from.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move project from {} to {}",
                from, next
            )));
        }

        let mut active: project::ActiveModel = existing.into();
        active.status = Set(next);
        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        info!(project_id = %id, %from, to = %next, "Project status changed");
        self.event_sender
            .send_or_log(Event::ProjectStatusChanged {
                project_id: id,
                from,
                to: next,
            })
            .await;
        Ok(updated)
    }

    /// Recomputes the price snapshot from current catalog prices.
    #[instrument(skip(self))]
    pub async fn reprice(&self, id: Uuid) -> Result<project::Model, ServiceError> {
        let existing = self.get_project(id).await?;
        if existing.status.is_final() {
            return Err(ServiceError::InvalidOperation(format!(
                "Project is {} and can no longer be repriced",
                existing.status
            )));
        }
        let template_id = existing.template_id.ok_or_else(|| {
            ServiceError::InvalidOperation("Project has no template to price from".into())
        })?;

        let new_total = self.snapshot_total(template_id, existing.quantity).await?;
        let old_total = existing.total_price;

        let mut active: project::ActiveModel = existing.into();
        active.total_price = Set(new_total);
        active.currency = Set(self.currency.clone());
        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        info!(project_id = %id, %old_total, %new_total, "Project repriced");
        self.event_sender
            .send_or_log(Event::ProjectRepriced {
                project_id: id,
                old_total,
                new_total,
            })
            .await;
        Ok(updated)
    }

    /// Live price breakdown at the project's quantity.
    #[instrument(skip(self))]
    pub async fn price_breakdown(&self, id: Uuid) -> Result<PriceBreakdown, ServiceError> {
        let existing = self.get_project(id).await?;
        match existing.template_id {
            Some(template_id) => self.template_price(template_id, existing.quantity).await,
            None => pricing::price_template(
                &[],
                Decimal::ZERO,
                existing.quantity,
                &self.currency,
            ),
        }
    }

    /// Material take-off scaled by the project quantity.
    #[instrument(skip(self))]
    pub async fn material_takeoff(&self, id: Uuid) -> Result<Vec<TakeoffLine>, ServiceError> {
        let existing = self.get_project(id).await?;
        let Some(template_id) = existing.template_id else {
            return Ok(Vec::new());
        };
        let lines = load_template_lines(&*self.db, template_id).await?;
        pricing::material_takeoff(&lines, existing.quantity)
    }

    /// Deletes a draft or cancelled project with its timeline. Projects that
    /// still hold uploads must have them removed first.
    #[instrument(skip(self))]
    pub async fn delete_project(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_project(id).await?;
        if !matches!(existing.status, ProjectStatus::Draft | ProjectStatus::Cancelled) {
            return Err(ServiceError::InvalidOperation(format!(
                "Only draft or cancelled projects can be deleted (project is {})",
                existing.status
            )));
        }
        let uploads = UploadEntity::find()
            .filter(upload::Column::ProjectId.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if uploads > 0 {
            return Err(ServiceError::Conflict(format!(
                "Project has {} upload(s); delete them first",
                uploads
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        TaskEntity::delete_many()
            .filter(project_task::Column::ProjectId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        MilestoneEntity::delete_many()
            .filter(project_milestone::Column::ProjectId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        ProjectEntity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(project_id = %id, "Project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::material;
    use crate::services::MAX_PROJECT_QUANTITY;
    use crate::services::assemblies::{AssemblyMaterialInput, AssemblyService, CreateAssemblyInput};
    use crate::services::clients::{ClientService, CreateClientInput};
    use crate::services::materials::{CreateMaterialInput, MaterialService, UpdateMaterialInput};
    use crate::services::templates::{CreateTemplateInput, TemplateLineInput, TemplateService};
    use crate::services::test_support;
    use crate::services::timelines::TimelineService;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Arc<DatabaseConnection>,
        projects: ProjectService,
        materials: MaterialService,
        material: material::Model,
        client_id: Uuid,
        template_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let materials = MaterialService::new(db.clone(), events.clone());
        let assemblies = AssemblyService::new(db.clone(), events.clone());
        let templates = TemplateService::new(db.clone(), events.clone(), "USD".into());
        let clients = ClientService::new(db.clone(), events.clone());

        let material = materials
            .create_material(CreateMaterialInput {
                name: "Stud".into(),
                sku: None,
                unit: "pc".into(),
                unit_price: dec!(2.25),
                description: None,
                supplier: None,
            })
            .await
            .unwrap();
        let wall = assemblies
            .create_assembly(CreateAssemblyInput {
                name: "Wall".into(),
                description: None,
                category_id: None,
                labor_cost: dec!(45),
                materials: vec![AssemblyMaterialInput {
                    material_id: material.id,
                    quantity: dec!(20),
                }],
            })
            .await
            .unwrap();
        let template = templates
            .create_template(CreateTemplateInput {
                name: "Shed".into(),
                description: None,
                category_id: None,
                markup_percent: dec!(0),
                assemblies: vec![TemplateLineInput {
                    assembly_id: wall.assembly.id,
                    quantity: dec!(4),
                    group_id: None,
                }],
                group_ids: vec![],
            })
            .await
            .unwrap();
        let client = clients
            .create_client(CreateClientInput {
                name: "Dana".into(),
                email: None,
                phone: None,
                company: None,
                address: None,
                notes: None,
                whatsapp_opt_in: false,
            })
            .await
            .unwrap();

        Fixture {
            projects: ProjectService::new(db.clone(), events, "USD".into()),
            db,
            materials,
            material,
            client_id: client.id,
            template_id: template.template.id,
        }
    }

    fn input(f: &Fixture, quantity: i32) -> CreateProjectInput {
        CreateProjectInput {
            name: "Backyard shed".into(),
            client_id: f.client_id,
            template_id: Some(f.template_id),
            quantity,
            start_date: None,
            end_date: None,
            site_address: None,
            notes: None,
            seed_timeline: false,
        }
    }

    #[tokio::test]
    async fn create_snapshots_price_scaled_by_quantity() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 2)).await.unwrap();

        // (20 × 2.25 + 45) × 4 = 360 per unit, two units
        assert_eq!(project.total_price, dec!(720));
        assert_eq!(project.status, ProjectStatus::Draft);
        assert_eq!(project.currency, "USD");

        let takeoff = f.projects.material_takeoff(project.id).await.unwrap();
        assert_eq!(takeoff[0].quantity, dec!(160));
    }

    #[tokio::test]
    async fn reprice_picks_up_catalog_changes() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 1)).await.unwrap();

        f.materials
            .update_material(
                f.material.id,
                UpdateMaterialInput {
                    unit_price: Some(dec!(4.5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let unchanged = f.projects.get_project(project.id).await.unwrap();
        assert_eq!(unchanged.total_price, dec!(360));

        let repriced = f.projects.reprice(project.id).await.unwrap();
        // (20 × 4.5 + 45) × 4
        assert_eq!(repriced.total_price, dec!(540));
    }

    #[tokio::test]
    async fn final_projects_keep_their_quantity_and_price() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 1)).await.unwrap();
        f.projects
            .change_status(project.id, ProjectStatus::Cancelled)
            .await
            .unwrap();

        let result = f
            .projects
            .update_project(
                project.id,
                UpdateProjectInput {
                    quantity: Some(5),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));

        // other fields stay editable
        let renamed = f
            .projects
            .update_project(
                project.id,
                UpdateProjectInput {
                    name: Some("Cancelled shed".into()),
                    quantity: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.quantity, 1);
        assert_eq!(renamed.total_price, dec!(360));
    }

    #[tokio::test]
    async fn quantity_is_bounded() {
        let f = fixture().await;
        assert_matches!(
            f.projects.create_project(input(&f, MAX_PROJECT_QUANTITY + 1)).await,
            Err(ServiceError::ValidationError(_))
        );
        let biggest = f
            .projects
            .create_project(input(&f, MAX_PROJECT_QUANTITY))
            .await
            .unwrap();
        assert_eq!(biggest.total_price, dec!(3600000));
    }

    #[tokio::test]
    async fn status_transitions_are_enforced() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 1)).await.unwrap();

        assert_matches!(
            f.projects.change_status(project.id, ProjectStatus::Completed).await,
            Err(ServiceError::InvalidStatus(_))
        );
        f.projects
            .change_status(project.id, ProjectStatus::Active)
            .await
            .unwrap();
        let done = f
            .projects
            .change_status(project.id, ProjectStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, ProjectStatus::Completed);
        assert_matches!(
            f.projects.reprice(project.id).await,
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn end_date_before_start_is_rejected() {
        let f = fixture().await;
        let mut bad = input(&f, 1);
        bad.start_date = NaiveDate::from_ymd_opt(2025, 5, 10);
        bad.end_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        assert_matches!(
            f.projects.create_project(bad).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut ok = input(&f, 1);
        ok.start_date = NaiveDate::from_ymd_opt(2025, 5, 10);
        let project = f.projects.create_project(ok).await.unwrap();
        let result = f
            .projects
            .update_project(
                project.id,
                UpdateProjectInput {
                    end_date: NaiveDate::from_ymd_opt(2025, 5, 1),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn unknown_client_is_a_validation_error() {
        let f = fixture().await;
        let mut bad = input(&f, 1);
        bad.client_id = Uuid::new_v4();
        assert_matches!(
            f.projects.create_project(bad).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn seed_timeline_adds_default_milestones() {
        let f = fixture().await;
        let mut seeded = input(&f, 1);
        seeded.seed_timeline = true;
        let project = f.projects.create_project(seeded).await.unwrap();

        let (events, _rx) = test_support::events();
        let timeline = TimelineService::new(f.db.clone(), events)
            .timeline(project.id)
            .await
            .unwrap();
        let titles: Vec<&str> = timeline
            .milestones
            .iter()
            .map(|m| m.milestone.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Planning", "Procurement", "Build", "Handover"]);
    }

    #[tokio::test]
    async fn quantity_update_reprices() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 1)).await.unwrap();
        let updated = f
            .projects
            .update_project(
                project.id,
                UpdateProjectInput {
                    quantity: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total_price, dec!(1080));
    }

    #[tokio::test]
    async fn only_draft_or_cancelled_projects_can_be_deleted() {
        let f = fixture().await;
        let project = f.projects.create_project(input(&f, 1)).await.unwrap();
        f.projects
            .change_status(project.id, ProjectStatus::Active)
            .await
            .unwrap();
        assert_matches!(
            f.projects.delete_project(project.id).await,
            Err(ServiceError::InvalidOperation(_))
        );

        f.projects
            .change_status(project.id, ProjectStatus::Cancelled)
            .await
            .unwrap();
        f.projects.delete_project(project.id).await.unwrap();
        assert_matches!(
            f.projects.get_project(project.id).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn list_filters_by_status_and_name() {
        let f = fixture().await;
        let a = f.projects.create_project(input(&f, 1)).await.unwrap();
        let mut other = input(&f, 1);
        other.name = "Garage".into();
        f.projects.create_project(other).await.unwrap();
        f.projects.change_status(a.id, ProjectStatus::Active).await.unwrap();

        let (active, total) = f
            .projects
            .list_projects(
                1,
                20,
                ProjectFilter {
                    status: Some(ProjectStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(active[0].id, a.id);

        let (found, _) = f
            .projects
            .list_projects(
                1,
                20,
                ProjectFilter {
                    search: Some("GARAGE".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
