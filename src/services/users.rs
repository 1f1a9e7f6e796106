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

use super::{clean, page_index};
use crate::{
    auth::{hash_password, verify_password},
    entities::user::{self, Entity as UserEntity, UserRole},
    errors::ServiceError,
    notifications::normalize_phone,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordInput {
    /// Required when changing your own password
    pub current_password: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_user(&self, input: CreateUserInput) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let phone = clean(input.phone).map(|p| normalize_phone(&p)).transpose()?;

        let created = user::ActiveModel {
            name: Set(input.name.trim().to_string()),
            email: Set(input.email.trim().to_lowercase()),
            password_hash: Set(hash_password(&input.password)?),
            role: Set(input.role),
            phone: Set(phone),
            active: Set(true),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to create user: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(user_id = %created.id, role = %created.role, "User created");
        Ok(created)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        UserEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn list_users(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<user::Model>, u64), ServiceError> {
        let paginator = UserEntity::find()
            .order_by_asc(user::Column::Email)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let users = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((users, total))
    }

    async fn active_admins(&self) -> Result<u64, ServiceError> {
        UserEntity::find()
            .filter(user::Column::Role.eq(UserRole::Admin))
            .filter(user::Column::Active.eq(true))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Updates a user. The last active admin cannot be demoted or disabled.
    #[instrument(skip(self, input))]
    pub async fn update_user(
        &self,
        id: Uuid,
        input: UpdateUserInput,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_user(id).await?;

        let loses_admin = existing.role == UserRole::Admin
            && existing.active
            && (input.role.map_or(false, |r| r != UserRole::Admin) || input.active == Some(false));
        if loses_admin && self.active_admins().await? <= 1 {
            return Err(ServiceError::InvalidOperation(
                "The last active admin cannot be demoted or disabled".into(),
            ));
        }

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.phone.is_some() {
            active.phone = Set(clean(input.phone).map(|p| normalize_phone(&p)).transpose()?);
        }
        if let Some(role) = input.role {
            active.role = Set(role);
        }
        if let Some(flag) = input.active {
            active.active = Set(flag);
        }
        active.update(&*self.db).await.map_err(ServiceError::db_error)
    }

    /// Changes a password. `actor_id` equal to `id` means a self-service
    /// change, which requires the current password.
    #[instrument(skip(self, input))]
    pub async fn change_password(
        &self,
        id: Uuid,
        actor_id: Uuid,
        input: ChangePasswordInput,
    ) -> Result<(), ServiceError> {
        input.validate()?;
        let existing = self.get_user(id).await?;

        if id == actor_id {
            let current = input.current_password.as_deref().unwrap_or_default();
            if !verify_password(current, &existing.password_hash) {
                return Err(ServiceError::Unauthorized(
                    "Current password is incorrect".into(),
                ));
            }
        }

        let mut active: user::ActiveModel = existing.into();
        active.password_hash = Set(hash_password(&input.new_password)?);
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        info!(user_id = %id, "Password changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid, actor_id: Uuid) -> Result<(), ServiceError> {
        if id == actor_id {
            return Err(ServiceError::InvalidOperation(
                "You cannot delete your own account".into(),
            ));
        }
        self.get_user(id).await?;
        UserEntity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Creates the first admin when the users table is empty. Returns the new
    /// admin, or `None` when users already exist.
    #[instrument(skip(self, password))]
    pub async fn bootstrap_admin(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let existing = UserEntity::find()
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if existing > 0 {
            return Ok(None);
        }

        let admin = self
            .create_user(CreateUserInput {
                name: "Administrator".into(),
                email: email.to_string(),
                password: password.to_string(),
                role: UserRole::Admin,
                phone: None,
            })
            .await?;
        info!(email = %admin.email, "Bootstrap admin created");
        Ok(Some(admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use assert_matches::assert_matches;

    fn input(email: &str, role: UserRole) -> CreateUserInput {
        CreateUserInput {
            name: "Sam".into(),
            email: email.into(),
            password: "correct-horse".into(),
            role,
            phone: Some("+1 555 123 4567".into()),
        }
    }

    #[tokio::test]
    async fn create_lowercases_email_and_hashes_password() {
        let service = UserService::new(test_support::db().await);
        let user = service
            .create_user(input("Sam@Example.COM", UserRole::Manager))
            .await
            .unwrap();
        assert_eq!(user.email, "sam@example.com");
        assert_eq!(user.phone.as_deref(), Some("+15551234567"));
        assert!(verify_password("correct-horse", &user.password_hash));

        assert_matches!(
            service.create_user(input("sam@example.com", UserRole::Viewer)).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn cannot_delete_yourself() {
        let service = UserService::new(test_support::db().await);
        let user = service
            .create_user(input("a@example.com", UserRole::Admin))
            .await
            .unwrap();
        assert_matches!(
            service.delete_user(user.id, user.id).await,
            Err(ServiceError::InvalidOperation(_))
        );
    }

    #[tokio::test]
    async fn last_admin_cannot_be_demoted() {
        let service = UserService::new(test_support::db().await);
        let admin = service
            .create_user(input("a@example.com", UserRole::Admin))
            .await
            .unwrap();
        let result = service
            .update_user(
                admin.id,
                UpdateUserInput {
                    role: Some(UserRole::Viewer),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn self_service_password_change_needs_current_password() {
        let service = UserService::new(test_support::db().await);
        let user = service
            .create_user(input("m@example.com", UserRole::Manager))
            .await
            .unwrap();

        let wrong = ChangePasswordInput {
            current_password: Some("nope".into()),
            new_password: "another-secret".into(),
        };
        assert_matches!(
            service.change_password(user.id, user.id, wrong).await,
            Err(ServiceError::Unauthorized(_))
        );

        let right = ChangePasswordInput {
            current_password: Some("correct-horse".into()),
            new_password: "another-secret".into(),
        };
        service.change_password(user.id, user.id, right).await.unwrap();
        let reloaded = service.get_user(user.id).await.unwrap();
        assert!(verify_password("another-secret", &reloaded.password_hash));
    }

    #[tokio::test]
    async fn bootstrap_only_runs_on_empty_table() {
        let service = UserService::new(test_support::db().await);
        let first = service
            .bootstrap_admin("root@example.com", "bootstrap-pass")
            .await
            .unwrap();
        assert_eq!(first.map(|u| u.role), Some(UserRole::Admin));
        assert!(service
            .bootstrap_admin("other@example.com", "bootstrap-pass")
            .await
            .unwrap()
            .is_none());
    }
}
