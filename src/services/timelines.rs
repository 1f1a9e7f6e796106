//! Project timelines: milestones, their tasks and progress tracking.
//!
//! Milestone status follows its tasks: when every task is done the milestone
//! completes, and reopening any task of a completed milestone moves it back
//! to `in_progress`.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::clean;
use crate::{
    entities::{
        project::Entity as ProjectEntity,
        project_milestone::{self, Entity as MilestoneEntity, MilestoneStatus},
        project_task::{self, Entity as TaskEntity, TaskStatus},
        user::Entity as UserEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Milestones seeded for a new project when asked to.
pub const DEFAULT_MILESTONES: [&str; 4] = ["Planning", "Procurement", "Build", "Handover"];

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMilestoneInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMilestoneInput {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub sort_order: Option<i32>,
    pub status: Option<MilestoneStatus>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTaskInput {
    pub milestone_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTaskInput {
    /// Moves the task to another milestone of the same project
    pub milestone_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MilestoneView {
    #[serde(flatten)]
    pub milestone: project_milestone::Model,
    /// Share of done tasks, 0.0 to 1.0
    pub progress: f64,
    pub tasks: Vec<project_task::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectTimeline {
    pub project_id: Uuid,
    pub progress: f64,
    pub total_tasks: usize,
    pub done_tasks: usize,
    pub milestones: Vec<MilestoneView>,
}

fn progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        done as f64 / total as f64
    }
}

fn is_done(task: &project_task::Model) -> bool {
    task.status == TaskStatus::Done
}

/// Status a milestone should have given its tasks, or `None` to leave it.
fn derived_status(
    current: MilestoneStatus,
    tasks: &[project_task::Model],
) -> Option<MilestoneStatus> {
    if tasks.is_empty() {
        return None;
    }
    let all_done = tasks.iter().all(is_done);
    match current {
        MilestoneStatus::Completed if !all_done => Some(MilestoneStatus::InProgress),
        MilestoneStatus::Pending | MilestoneStatus::InProgress if all_done => {
            Some(MilestoneStatus::Completed)
        }
        MilestoneStatus::Pending if tasks.iter().any(|t| t.status != TaskStatus::Todo) => {
            Some(MilestoneStatus::InProgress)
        }
        _ => None,
    }
}

pub(crate) async fn seed_default_milestones<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<(), ServiceError> {
    for (position, title) in DEFAULT_MILESTONES.iter().enumerate() {
        project_milestone::ActiveModel {
            project_id: Set(project_id),
            title: Set((*title).to_string()),
            status: Set(MilestoneStatus::Pending),
            sort_order: Set(position as i32),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct TimelineService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl TimelineService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn ensure_project(&self, project_id: Uuid) -> Result<(), ServiceError> {
        ProjectEntity::find_by_id(project_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))?;
        Ok(())
    }

    async fn milestone(
        &self,
        project_id: Uuid,
        milestone_id: Uuid,
    ) -> Result<project_milestone::Model, ServiceError> {
        MilestoneEntity::find_by_id(milestone_id)
            .filter(project_milestone::Column::ProjectId.eq(project_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Milestone", milestone_id))
    }

    async fn task(&self, project_id: Uuid, task_id: Uuid) -> Result<project_task::Model, ServiceError> {
        TaskEntity::find_by_id(task_id)
            .filter(project_task::Column::ProjectId.eq(project_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Task", task_id))
    }

    async fn ensure_assignee(&self, assignee_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(id) = assignee_id {
            UserEntity::find_by_id(id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::ValidationError(format!("User {} does not exist", id)))?;
        }
        Ok(())
    }

    async fn milestone_tasks(&self, milestone_id: Uuid) -> Result<Vec<project_task::Model>, ServiceError> {
        TaskEntity::find()
            .filter(project_task::Column::MilestoneId.eq(milestone_id))
            .order_by_asc(project_task::Column::CreatedAt)
            .order_by_asc(project_task::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Re-derives a milestone's status from its tasks, emitting an event when
    /// it completes or reopens.
    async fn sync_milestone(&self, milestone: project_milestone::Model) -> Result<(), ServiceError> {
        let tasks = self.milestone_tasks(milestone.id).await?;
        let Some(next) = derived_status(milestone.status, &tasks) else {
            return Ok(());
        };

        let previous = milestone.status;
        let (project_id, milestone_id, title) =
            (milestone.project_id, milestone.id, milestone.title.clone());
        let mut active: project_milestone::ActiveModel = milestone.into();
        active.status = Set(next);
        active.completed_at = Set((next == MilestoneStatus::Completed).then(Utc::now));
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        match (previous, next) {
            (_, MilestoneStatus::Completed) => {
                info!(%milestone_id, "Milestone completed");
                self.event_sender
                    .send_or_log(Event::MilestoneCompleted {
                        project_id,
                        milestone_id,
                        title,
                    })
                    .await;
            }
            (MilestoneStatus::Completed, _) => {
                self.event_sender
                    .send_or_log(Event::MilestoneReopened {
                        project_id,
                        milestone_id,
                    })
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn timeline(&self, project_id: Uuid) -> Result<ProjectTimeline, ServiceError> {
        self.ensure_project(project_id).await?;

        let mut milestones = MilestoneEntity::find()
            .filter(project_milestone::Column::ProjectId.eq(project_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        // sort_order first, then due date with undated milestones last
        milestones.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| match (a.due_date, b.due_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => a.created_at.cmp(&b.created_at),
                })
        });

        let tasks = TaskEntity::find()
            .filter(project_task::Column::ProjectId.eq(project_id))
            .order_by_asc(project_task::Column::CreatedAt)
            .order_by_asc(project_task::Column::Id)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let total_tasks = tasks.len();
        let done_tasks = tasks.iter().filter(|t| is_done(t)).count();

        let milestones = milestones
            .into_iter()
            .map(|m| {
                let own: Vec<project_task::Model> = tasks
                    .iter()
                    .filter(|t| t.milestone_id == m.id)
                    .cloned()
                    .collect();
                MilestoneView {
                    progress: progress(own.iter().filter(|t| is_done(t)).count(), own.len()),
                    milestone: m,
                    tasks: own,
                }
            })
            .collect();

        Ok(ProjectTimeline {
            project_id,
            progress: progress(done_tasks, total_tasks),
            total_tasks,
            done_tasks,
            milestones,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn add_milestone(
        &self,
        project_id: Uuid,
        input: CreateMilestoneInput,
    ) -> Result<project_milestone::Model, ServiceError> {
        input.validate()?;
        self.ensure_project(project_id).await?;

        let sort_order = match input.sort_order {
            Some(order) => order,
            None => MilestoneEntity::find()
                .filter(project_milestone::Column::ProjectId.eq(project_id))
                .all(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .iter()
                .map(|m| m.sort_order + 1)
                .max()
                .unwrap_or(0),
        };

        project_milestone::ActiveModel {
            project_id: Set(project_id),
            title: Set(input.title.trim().to_string()),
            description: Set(clean(input.description)),
            due_date: Set(input.due_date),
            status: Set(MilestoneStatus::Pending),
            sort_order: Set(sort_order),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input))]
    pub async fn update_milestone(
        &self,
        project_id: Uuid,
        milestone_id: Uuid,
        input: UpdateMilestoneInput,
    ) -> Result<project_milestone::Model, ServiceError> {
        input.validate()?;
        let milestone = self.milestone(project_id, milestone_id).await?;
        let previous = milestone.status;

        if input.status == Some(MilestoneStatus::Completed) {
            let tasks = self.milestone_tasks(milestone_id).await?;
            if !tasks.iter().all(is_done) {
                return Err(ServiceError::InvalidOperation(
                    "Milestone has open tasks".into(),
                ));
            }
        }

        let mut active: project_milestone::ActiveModel = milestone.into();
        if let Some(title) = input.title {
            active.title = Set(title.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if input.due_date.is_some() {
            active.due_date = Set(input.due_date);
        }
        if let Some(order) = input.sort_order {
            active.sort_order = Set(order);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
            active.completed_at = Set((status == MilestoneStatus::Completed).then(Utc::now));
        }
        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        if previous != MilestoneStatus::Completed && updated.status == MilestoneStatus::Completed {
            self.event_sender
                .send_or_log(Event::MilestoneCompleted {
                    project_id,
                    milestone_id,
                    title: updated.title.clone(),
                })
                .await;
        }
        Ok(updated)
    }

    /// Deletes a milestone with all of its tasks.
    #[instrument(skip(self))]
    pub async fn delete_milestone(&self, project_id: Uuid, milestone_id: Uuid) -> Result<(), ServiceError> {
        self.milestone(project_id, milestone_id).await?;
        TaskEntity::delete_many()
            .filter(project_task::Column::MilestoneId.eq(milestone_id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        MilestoneEntity::delete_by_id(milestone_id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_task(
        &self,
        project_id: Uuid,
        input: CreateTaskInput,
    ) -> Result<project_task::Model, ServiceError> {
        input.validate()?;
        let milestone = self.milestone(project_id, input.milestone_id).await?;
        self.ensure_assignee(input.assignee_id).await?;

        let task = project_task::ActiveModel {
            project_id: Set(project_id),
            milestone_id: Set(milestone.id),
            title: Set(input.title.trim().to_string()),
            description: Set(clean(input.description)),
            assignee_id: Set(input.assignee_id),
            due_date: Set(input.due_date),
            status: Set(TaskStatus::Todo),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        self.sync_milestone(milestone).await?;
        Ok(task)
    }

    #[instrument(skip(self, input))]
    pub async fn update_task(
        &self,
        project_id: Uuid,
        task_id: Uuid,
        input: UpdateTaskInput,
    ) -> Result<project_task::Model, ServiceError> {
        input.validate()?;
        let task = self.task(project_id, task_id).await?;
        let old_milestone = task.milestone_id;
        let new_milestone = match input.milestone_id {
            Some(id) if id != old_milestone => Some(self.milestone(project_id, id).await?.id),
            _ => None,
        };
        if input.assignee_id.is_some() {
            self.ensure_assignee(input.assignee_id).await?;
        }

        let mut active: project_task::ActiveModel = task.into();
        if let Some(milestone_id) = new_milestone {
            active.milestone_id = Set(milestone_id);
        }
        if let Some(title) = input.title {
            active.title = Set(title.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if input.assignee_id.is_some() {
            active.assignee_id = Set(input.assignee_id);
        }
        if input.due_date.is_some() {
            active.due_date = Set(input.due_date);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
            active.completed_at = Set((status == TaskStatus::Done).then(Utc::now));
        }
        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        self.sync_milestone(self.milestone(project_id, updated.milestone_id).await?)
            .await?;
        if new_milestone.is_some() {
            self.sync_milestone(self.milestone(project_id, old_milestone).await?)
                .await?;
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_task(&self, project_id: Uuid, task_id: Uuid) -> Result<(), ServiceError> {
        let task = self.task(project_id, task_id).await?;
        TaskEntity::delete_by_id(task_id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.sync_milestone(self.milestone(project_id, task.milestone_id).await?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{client, project};
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;

    async fn project(db: &DatabaseConnection) -> Uuid {
        let client = client::ActiveModel {
            name: Set("Acme".into()),
            whatsapp_opt_in: Set(false),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();
        project::ActiveModel {
            name: Set("Barn".into()),
            client_id: Set(client.id),
            status: Set(project::ProjectStatus::Active),
            quantity: Set(1),
            total_price: Set(Decimal::ZERO),
            currency: Set("USD".into()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    fn task(milestone_id: Uuid, title: &str) -> CreateTaskInput {
        CreateTaskInput {
            milestone_id,
            title: title.into(),
            description: None,
            assignee_id: None,
            due_date: None,
        }
    }

    fn done() -> UpdateTaskInput {
        UpdateTaskInput {
            status: Some(TaskStatus::Done),
            ..Default::default()
        }
    }

    #[test]
    fn derived_status_rules() {
        assert_eq!(derived_status(MilestoneStatus::Pending, &[]), None);
    }

    #[tokio::test]
    async fn completing_all_tasks_completes_milestone_and_reopen_reverts() {
        let db = test_support::db().await;
        let (events, mut rx) = test_support::events();
        let service = TimelineService::new(db.clone(), events);
        let project_id = project(&db).await;

        let milestone = service
            .add_milestone(
                project_id,
                CreateMilestoneInput {
                    title: "Framing".into(),
                    description: None,
                    due_date: None,
                    sort_order: None,
                },
            )
            .await
            .unwrap();
        let a = service.add_task(project_id, task(milestone.id, "Walls")).await.unwrap();
        let b = service.add_task(project_id, task(milestone.id, "Roof")).await.unwrap();

        service.update_task(project_id, a.id, done()).await.unwrap();
        let timeline = service.timeline(project_id).await.unwrap();
        assert_eq!(timeline.milestones[0].milestone.status, MilestoneStatus::InProgress);
        assert_eq!(timeline.progress, 0.5);

        service.update_task(project_id, b.id, done()).await.unwrap();
        let timeline = service.timeline(project_id).await.unwrap();
        assert_eq!(timeline.milestones[0].milestone.status, MilestoneStatus::Completed);
        assert!(timeline.milestones[0].milestone.completed_at.is_some());
        assert_eq!(timeline.milestones[0].progress, 1.0);

        service
            .update_task(
                project_id,
                b.id,
                UpdateTaskInput {
                    status: Some(TaskStatus::InProgress),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let timeline = service.timeline(project_id).await.unwrap();
        assert_eq!(timeline.milestones[0].milestone.status, MilestoneStatus::InProgress);
        assert!(timeline.milestones[0].milestone.completed_at.is_none());

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names, vec!["milestone_completed", "milestone_reopened"]);
    }

    #[tokio::test]
    async fn timeline_orders_by_sort_order_then_due_date() {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let service = TimelineService::new(db.clone(), events);
        let project_id = project(&db).await;

        for (title, order, due) in [
            ("Late", 1, Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())),
            ("Undated", 1, None),
            ("Early", 1, Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())),
            ("First", 0, None),
        ] {
            service
                .add_milestone(
                    project_id,
                    CreateMilestoneInput {
                        title: title.into(),
                        description: None,
                        due_date: due,
                        sort_order: Some(order),
                    },
                )
                .await
                .unwrap();
        }

        let titles: Vec<String> = service
            .timeline(project_id)
            .await
            .unwrap()
            .milestones
            .into_iter()
            .map(|m| m.milestone.title)
            .collect();
        assert_eq!(titles, vec!["First", "Early", "Late", "Undated"]);
    }

    #[tokio::test]
    async fn empty_timeline_has_zero_progress() {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let service = TimelineService::new(db.clone(), events);
        let project_id = project(&db).await;

        let timeline = service.timeline(project_id).await.unwrap();
        assert_eq!(timeline.progress, 0.0);
        assert!(timeline.milestones.is_empty());
    }

    #[tokio::test]
    async fn task_must_reference_milestone_of_same_project() {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let service = TimelineService::new(db.clone(), events);
        let project_id = project(&db).await;

        assert_matches!(
            service.add_task(project_id, task(Uuid::new_v4(), "Orphan")).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn milestone_with_open_tasks_cannot_be_completed_by_hand() {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let service = TimelineService::new(db.clone(), events);
        let project_id = project(&db).await;
        let milestone = service
            .add_milestone(
                project_id,
                CreateMilestoneInput {
                    title: "Build".into(),
                    description: None,
                    due_date: None,
                    sort_order: None,
                },
            )
            .await
            .unwrap();
        service.add_task(project_id, task(milestone.id, "Pour")).await.unwrap();

        let result = service
            .update_milestone(
                project_id,
                milestone.id,
                UpdateMilestoneInput {
                    status: Some(MilestoneStatus::Completed),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
    }
}
