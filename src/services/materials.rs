use rust_decimal::Decimal;
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

use super::{clean, ilike, page_index, validate_amount};
use crate::{
    entities::{
        assembly_material::{self, Entity as AssemblyMaterialEntity},
        material::{self, Entity as MaterialEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub unit: String,
    #[validate(custom = "validate_amount")]
    pub unit_price: Decimal,
    pub description: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMaterialInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub unit: Option<String>,
    #[validate(custom = "validate_amount")]
    pub unit_price: Option<Decimal>,
    pub description: Option<String>,
    pub supplier: Option<String>,
}

/// Material catalog
#[derive(Clone)]
pub struct MaterialService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl MaterialService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_material(
        &self,
        input: CreateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;

        let created = material::ActiveModel {
            name: Set(input.name.trim().to_string()),
            sku: Set(clean(input.sku)),
            unit: Set(input.unit.trim().to_string()),
            unit_price: Set(input.unit_price),
            description: Set(clean(input.description)),
            supplier: Set(clean(input.supplier)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!("Failed to create material: {}", e);
            ServiceError::db_error(e)
        })?;

        info!(material_id = %created.id, "Material created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_material(&self, id: Uuid) -> Result<material::Model, ServiceError> {
        MaterialEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Material", id))
    }

    #[instrument(skip(self))]
    pub async fn list_materials(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<(Vec<material::Model>, u64), ServiceError> {
        let mut query = MaterialEntity::find();
        if let Some(term) = clean(search) {
            query = query.filter(
                ilike(material::Column::Name, &term).or(ilike(material::Column::Sku, &term)),
            );
        }

        let paginator = query
            .order_by_asc(material::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let materials = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((materials, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_material(
        &self,
        id: Uuid,
        input: UpdateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_material(id).await?;
        let old_price = existing.unit_price;
        let mut active: material::ActiveModel = existing.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.sku.is_some() {
            active.sku = Set(clean(input.sku));
        }
        if let Some(unit) = input.unit {
            active.unit = Set(unit.trim().to_string());
        }
        if let Some(price) = input.unit_price {
            active.unit_price = Set(price);
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if input.supplier.is_some() {
            active.supplier = Set(clean(input.supplier));
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(material_id = %id, "Failed to update material: {}", e);
            ServiceError::db_error(e)
        })?;

        if updated.unit_price != old_price {
            self.event_sender
                .send_or_log(Event::MaterialPriceChanged {
                    material_id: id,
                    old_price,
                    new_price: updated.unit_price,
                })
                .await;
        }
        Ok(updated)
    }

    /// Deletes a material that no assembly uses.
    #[instrument(skip(self))]
    pub async fn delete_material(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.get_material(id).await?;

        let usages = AssemblyMaterialEntity::find()
            .filter(assembly_material::Column::MaterialId.eq(id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if usages > 0 {
            return Err(ServiceError::Conflict(format!(
                "Material {} is used by {} assembly line(s)",
                id, usages
            )));
        }

        MaterialEntity::delete_by_id(id)
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(material_id = %id, "Material deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn plywood() -> CreateMaterialInput {
        CreateMaterialInput {
            name: "Plywood 18mm".into(),
            sku: Some("PLY-18".into()),
            unit: "sheet".into(),
            unit_price: dec!(42.5),
            description: None,
            supplier: Some("Timberline".into()),
        }
    }

    #[tokio::test]
    async fn duplicate_sku_is_a_conflict() {
        let (events, _rx) = test_support::events();
        let service = MaterialService::new(test_support::db().await, events);

        service.create_material(plywood()).await.unwrap();
        assert_matches!(
            service.create_material(plywood()).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn negative_price_fails_validation() {
        let (events, _rx) = test_support::events();
        let service = MaterialService::new(test_support::db().await, events);

        let mut input = plywood();
        input.unit_price = dec!(-1);
        assert_matches!(
            service.create_material(input).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn price_change_emits_event() {
        let (events, mut rx) = test_support::events();
        let service = MaterialService::new(test_support::db().await, events);
        let material = service.create_material(plywood()).await.unwrap();

        service
            .update_material(
                material.id,
                UpdateMaterialInput {
                    unit_price: Some(dec!(45)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_matches!(
            rx.try_recv(),
            Ok(Event::MaterialPriceChanged { material_id, .. }) if material_id == material.id
        );
    }

    #[tokio::test]
    async fn search_matches_sku() {
        let (events, _rx) = test_support::events();
        let service = MaterialService::new(test_support::db().await, events);
        service.create_material(plywood()).await.unwrap();

        let (found, total) = service.list_materials(1, 10, Some("ply-".into())).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].sku.as_deref(), Some("PLY-18"));
    }
}
