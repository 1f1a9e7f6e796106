use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::clean;
use crate::{
    entities::{
        assembly::{self, Entity as AssemblyEntity},
        assembly_category::{self, Entity as CategoryEntity},
        assembly_group::{self, Entity as GroupEntity},
        template::{self, Entity as TemplateEntity},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct AssemblyCategoryService {
    db: Arc<DatabaseConnection>,
}

impl AssemblyCategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CategoryInput,
    ) -> Result<assembly_category::Model, ServiceError> {
        input.validate()?;
        let created = assembly_category::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(clean(input.description)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to create assembly category: {}", e);
            ServiceError::db_error(e)
        })?;
        info!(category_id = %created.id, "Assembly category created");
        Ok(created)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<assembly_category::Model, ServiceError> {
        CategoryEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Assembly category", id))
    }

    pub async fn list_categories(&self) -> Result<Vec<assembly_category::Model>, ServiceError> {
        CategoryEntity::find()
            .order_by_asc(assembly_category::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<assembly_category::Model, ServiceError> {
        input.validate()?;
        let mut active: assembly_category::ActiveModel = self.get_category(id).await?.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        active.update(&*self.db).await.map_err(ServiceError::db_error)
    }

    /// Deletes a category; assemblies, groups and templates in it become
    /// uncategorized.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: Uuid) -> Result<(), ServiceError> {
        self.get_category(id).await?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        AssemblyEntity::update_many()
            .col_expr(assembly::Column::CategoryId, Expr::value(Option::<Uuid>::None))
            .filter(assembly::Column::CategoryId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        GroupEntity::update_many()
            .col_expr(assembly_group::Column::CategoryId, Expr::value(Option::<Uuid>::None))
            .filter(assembly_group::Column::CategoryId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        TemplateEntity::update_many()
            .col_expr(template::Column::CategoryId, Expr::value(Option::<Uuid>::None))
            .filter(template::Column::CategoryId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        CategoryEntity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(category_id = %id, "Assembly category deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn deleting_category_uncategorizes_assemblies() {
        let db = test_support::db().await;
        let service = AssemblyCategoryService::new(db.clone());
        let category = service
            .create_category(CategoryInput {
                name: "Framing".into(),
                description: None,
            })
            .await
            .unwrap();

        let assembly = assembly::ActiveModel {
            name: Set("Wall".into()),
            category_id: Set(Some(category.id)),
            labor_cost: Set(Decimal::ZERO),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        service.delete_category(category.id).await.unwrap();

        let reloaded = AssemblyEntity::find_by_id(assembly.id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.category_id, None);
        assert_matches!(
            service.get_category(category.id).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn category_names_are_unique() {
        let service = AssemblyCategoryService::new(test_support::db().await);
        let input = CategoryInput {
            name: "Roofing".into(),
            description: None,
        };
        service.create_category(input.clone()).await.unwrap();
        assert_matches!(
            service.create_category(input).await,
            Err(ServiceError::Conflict(_))
        );
    }
}
