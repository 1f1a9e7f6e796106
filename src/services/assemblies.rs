use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::pricing::{self, AssemblyBreakdown, PricedAssembly, PricedMaterial};
use super::{clean, ilike, nullable, page_index, validate_amount, validate_line_quantity};
use crate::{
    entities::{
        assembly::{self, Entity as AssemblyEntity},
        assembly_category::Entity as CategoryEntity,
        assembly_material::{self, Entity as AssemblyMaterialEntity},
        material::{self, Entity as MaterialEntity},
        template_assembly::{self, Entity as TemplateAssemblyEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AssemblyMaterialInput {
    pub material_id: Uuid,
    #[validate(custom = "validate_line_quantity")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateAssemblyInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "validate_amount")]
    pub labor_cost: Decimal,
    #[serde(default)]
    pub materials: Vec<AssemblyMaterialInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateAssemblyInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    /// `null` clears the category
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub category_id: Option<Option<Uuid>>,
    #[validate(custom = "validate_amount")]
    pub labor_cost: Option<Decimal>,
}

/// BOM line with the material it points at
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssemblyLineView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssemblyDetail {
    #[serde(flatten)]
    pub assembly: assembly::Model,
    pub materials: Vec<AssemblyLineView>,
    pub unit_cost: Decimal,
}

/// Loads assemblies with their BOM lines and current material prices,
/// keyed by assembly id. Unknown ids are simply absent from the map.
pub(crate) async fn load_priced_assemblies<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, PricedAssembly>, ServiceError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let assemblies = AssemblyEntity::find()
        .filter(assembly::Column::Id.is_in(ids.to_vec()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let lines = AssemblyMaterialEntity::find()
        .filter(assembly_material::Column::AssemblyId.is_in(ids.to_vec()))
        .order_by_asc(assembly_material::Column::CreatedAt)
        .order_by_asc(assembly_material::Column::Id)
        .find_also_related(MaterialEntity)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut priced: HashMap<Uuid, PricedAssembly> = assemblies
        .into_iter()
        .map(|a| {
            (
                a.id,
                PricedAssembly {
                    assembly_id: a.id,
                    name: a.name,
                    labor_cost: a.labor_cost,
                    materials: Vec::new(),
                },
            )
        })
        .collect();

    for (line, material) in lines {
        let Some(material) = material else {
            warn!(line_id = %line.id, "BOM line without material skipped");
            continue;
        };
        if let Some(entry) = priced.get_mut(&line.assembly_id) {
            entry.materials.push(PricedMaterial {
                material_id: material.id,
                name: material.name,
                unit: material.unit,
                unit_price: material.unit_price,
                quantity: line.quantity,
            });
        }
    }

    Ok(priced)
}

async fn ensure_materials_exist<C: ConnectionTrait>(
    conn: &C,
    lines: &[AssemblyMaterialInput],
) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for line in lines {
        if !seen.insert(line.material_id) {
            return Err(ServiceError::ValidationError(format!(
                "Material {} is listed more than once",
                line.material_id
            )));
        }
    }
    if seen.is_empty() {
        return Ok(());
    }

    let found = MaterialEntity::find()
        .filter(material::Column::Id.is_in(seen.iter().copied().collect::<Vec<_>>()))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if found as usize != seen.len() {
        return Err(ServiceError::ValidationError(
            "One or more materials do not exist".into(),
        ));
    }
    Ok(())
}

async fn insert_lines<C: ConnectionTrait>(
    conn: &C,
    assembly_id: Uuid,
    lines: &[AssemblyMaterialInput],
) -> Result<(), ServiceError> {
    for line in lines {
        assembly_material::ActiveModel {
            assembly_id: Set(assembly_id),
            material_id: Set(line.material_id),
            quantity: Set(line.quantity),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Assemblies (bills of materials) and their material lines
#[derive(Clone)]
pub struct AssemblyService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl AssemblyService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn ensure_category(&self, category_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(id) = category_id {
            CategoryEntity::find_by_id(id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::ValidationError(format!("Category {} does not exist", id)))?;
        }
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name, lines = input.materials.len()))]
    pub async fn create_assembly(
        &self,
        input: CreateAssemblyInput,
    ) -> Result<AssemblyDetail, ServiceError> {
        input.validate()?;
        for line in &input.materials {
            line.validate()?;
        }
        self.ensure_category(input.category_id).await?;
        ensure_materials_exist(&*self.db, &input.materials).await?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let created = assembly::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(clean(input.description)),
            category_id: Set(input.category_id),
            labor_cost: Set(input.labor_cost),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!("Failed to create assembly: {}", e);
            ServiceError::db_error(e)
        })?;
        insert_lines(&txn, created.id, &input.materials).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(assembly_id = %created.id, "Assembly created");
        self.event_sender
            .send_or_log(Event::AssemblyChanged(created.id))
            .await;
        self.get_assembly(created.id).await
    }

    pub async fn find_assembly(&self, id: Uuid) -> Result<assembly::Model, ServiceError> {
        AssemblyEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Assembly", id))
    }

    /// Assembly with its lines and unit cost.
    #[instrument(skip(self))]
    pub async fn get_assembly(&self, id: Uuid) -> Result<AssemblyDetail, ServiceError> {
        let assembly = self.find_assembly(id).await?;
        let lines = AssemblyMaterialEntity::find()
            .filter(assembly_material::Column::AssemblyId.eq(id))
            .order_by_asc(assembly_material::Column::CreatedAt)
            .order_by_asc(assembly_material::Column::Id)
            .find_also_related(MaterialEntity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut materials = Vec::with_capacity(lines.len());
        let mut material_cost = Decimal::ZERO;
        for (line, m) in lines
            .into_iter()
            .filter_map(|(line, material)| material.map(|m| (line, m)))
        {
            let cost = pricing::mul(m.unit_price, line.quantity)?;
            material_cost = pricing::add(material_cost, cost)?;
            materials.push(AssemblyLineView {
                id: line.id,
                material_id: m.id,
                material_name: m.name,
                unit: m.unit,
                unit_price: m.unit_price,
                quantity: line.quantity,
                line_total: pricing::round_money(cost),
            });
        }
        let unit_cost = pricing::round_money(pricing::add(material_cost, assembly.labor_cost)?);

        Ok(AssemblyDetail {
            assembly,
            materials,
            unit_cost,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_assemblies(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
        category_id: Option<Uuid>,
    ) -> Result<(Vec<assembly::Model>, u64), ServiceError> {
        let mut query = AssemblyEntity::find();
        if let Some(term) = clean(search) {
            query = query.filter(ilike(assembly::Column::Name, &term));
        }
        if let Some(category_id) = category_id {
            query = query.filter(assembly::Column::CategoryId.eq(category_id));
        }

        let paginator = query
            .order_by_asc(assembly::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    #[instrument(skip(self, input))]
    pub async fn update_assembly(
        &self,
        id: Uuid,
        input: UpdateAssemblyInput,
    ) -> Result<assembly::Model, ServiceError> {
        input.validate()?;
        let mut active: assembly::ActiveModel = self.find_assembly(id).await?.into();

        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            active.category_id = Set(category_id);
        }
        if let Some(labor) = input.labor_cost {
            active.labor_cost = Set(labor);
        }

        let updated = active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        self.event_sender.send_or_log(Event::AssemblyChanged(id)).await;
        Ok(updated)
    }

    /// Replaces the whole material list of an assembly.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn replace_materials(
        &self,
        id: Uuid,
        lines: Vec<AssemblyMaterialInput>,
    ) -> Result<AssemblyDetail, ServiceError> {
        for line in &lines {
            line.validate()?;
        }
        self.find_assembly(id).await?;
        ensure_materials_exist(&*self.db, &lines).await?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        AssemblyMaterialEntity::delete_many()
            .filter(assembly_material::Column::AssemblyId.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        insert_lines(&txn, id, &lines).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender.send_or_log(Event::AssemblyChanged(id)).await;
        self.get_assembly(id).await
    }

    /// Adds a material line, or changes its quantity if already present.
    #[instrument(skip(self))]
    pub async fn upsert_material(
        &self,
        id: Uuid,
        line: AssemblyMaterialInput,
    ) -> Result<assembly_material::Model, ServiceError> {
        line.validate()?;
        let db = &*self.db;
        self.find_assembly(id).await?;
        ensure_materials_exist(db, std::slice::from_ref(&line)).await?;

        let existing = AssemblyMaterialEntity::find()
            .filter(assembly_material::Column::AssemblyId.eq(id))
            .filter(assembly_material::Column::MaterialId.eq(line.material_id))
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let saved = match existing {
            Some(current) => {
                let mut active: assembly_material::ActiveModel = current.into();
                active.quantity = Set(line.quantity);
                active.update(db).await
            }
            None => {
                assembly_material::ActiveModel {
                    assembly_id: Set(id),
                    material_id: Set(line.material_id),
                    quantity: Set(line.quantity),
                    ..Default::default()
                }
                .insert(db)
                .await
            }
        }
        .map_err(ServiceError::db_error)?;

        self.event_sender.send_or_log(Event::AssemblyChanged(id)).await;
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn remove_material(&self, id: Uuid, material_id: Uuid) -> Result<(), ServiceError> {
        let result = AssemblyMaterialEntity::delete_many()
            .filter(assembly_material::Column::AssemblyId.eq(id))
            .filter(assembly_material::Column::MaterialId.eq(material_id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Material {} is not part of assembly {}",
                material_id, id
            )));
        }
        self.event_sender.send_or_log(Event::AssemblyChanged(id)).await;
        Ok(())
    }

    /// Deletes an assembly no template uses.
    #[instrument(skip(self))]
    pub async fn delete_assembly(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.find_assembly(id).await?;

        let usages = TemplateAssemblyEntity::find()
            .filter(template_assembly::Column::AssemblyId.eq(id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if usages > 0 {
            return Err(ServiceError::Conflict(format!(
                "Assembly {} is used by {} template line(s)",
                id, usages
            )));
        }

        AssemblyEntity::delete_by_id(id)
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(assembly_id = %id, "Assembly deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn price_assembly(&self, id: Uuid) -> Result<AssemblyBreakdown, ServiceError> {
        let priced = load_priced_assemblies(&*self.db, &[id]).await?;
        let assembly = priced
            .get(&id)
            .ok_or_else(|| ServiceError::not_found("Assembly", id))?;
        pricing::price_assembly(assembly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::materials::{CreateMaterialInput, MaterialService};
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    async fn setup() -> (AssemblyService, MaterialService) {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        (
            AssemblyService::new(db.clone(), events.clone()),
            MaterialService::new(db, events),
        )
    }

    async fn material(service: &MaterialService, name: &str, price: Decimal) -> Uuid {
        service
            .create_material(CreateMaterialInput {
                name: name.into(),
                sku: None,
                unit: "pcs".into(),
                unit_price: price,
                description: None,
                supplier: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_with_lines_and_price() {
        let (assemblies, materials) = setup().await;
        let stud = material(&materials, "Stud", dec!(2.25)).await;
        let board = material(&materials, "Board", dec!(12.5)).await;

        let detail = assemblies
            .create_assembly(CreateAssemblyInput {
                name: "Partition".into(),
                description: None,
                category_id: None,
                labor_cost: dec!(100),
                materials: vec![
                    AssemblyMaterialInput {
                        material_id: stud,
                        quantity: dec!(8),
                    },
                    AssemblyMaterialInput {
                        material_id: board,
                        quantity: dec!(2),
                    },
                ],
            })
            .await
            .unwrap();

        assert_eq!(detail.materials.len(), 2);
        assert_eq!(detail.unit_cost, dec!(143));

        let breakdown = assemblies.price_assembly(detail.assembly.id).await.unwrap();
        assert_eq!(breakdown.material_cost, dec!(43));
        assert_eq!(breakdown.line_total, dec!(143));
    }

    #[tokio::test]
    async fn out_of_range_prices_and_quantities_are_rejected() {
        let (assemblies, materials) = setup().await;
        let result = materials
            .create_material(CreateMaterialInput {
                name: "Gold".into(),
                sku: None,
                unit: "kg".into(),
                unit_price: dec!(100000000000000000000),
                description: None,
                supplier: None,
            })
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));

        let priciest = material(&materials, "Gold", crate::services::MAX_AMOUNT).await;
        let line = |quantity| AssemblyMaterialInput {
            material_id: priciest,
            quantity,
        };
        let input = |quantity| CreateAssemblyInput {
            name: "Vault".into(),
            description: None,
            category_id: None,
            labor_cost: crate::services::MAX_AMOUNT,
            materials: vec![line(quantity)],
        };

        assert_matches!(
            assemblies.create_assembly(input(dec!(1000000000))).await,
            Err(ServiceError::ValidationError(_))
        );

        let detail = assemblies
            .create_assembly(input(crate::services::MAX_LINE_QUANTITY))
            .await
            .unwrap();
        assert_eq!(detail.unit_cost, dec!(1000001000000000));
        let breakdown = assemblies.price_assembly(detail.assembly.id).await.unwrap();
        assert_eq!(breakdown.line_total, dec!(1000001000000000));
    }

    #[tokio::test]
    async fn duplicate_material_lines_are_rejected() {
        let (assemblies, materials) = setup().await;
        let stud = material(&materials, "Stud", dec!(2.25)).await;
        let line = AssemblyMaterialInput {
            material_id: stud,
            quantity: dec!(1),
        };

        let result = assemblies
            .create_assembly(CreateAssemblyInput {
                name: "Twice".into(),
                description: None,
                category_id: None,
                labor_cost: Decimal::ZERO,
                materials: vec![line.clone(), line],
            })
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn upsert_then_remove_line() {
        let (assemblies, materials) = setup().await;
        let stud = material(&materials, "Stud", dec!(2.25)).await;
        let detail = assemblies
            .create_assembly(CreateAssemblyInput {
                name: "Frame".into(),
                description: None,
                category_id: None,
                labor_cost: Decimal::ZERO,
                materials: vec![],
            })
            .await
            .unwrap();
        let id = detail.assembly.id;

        let line = AssemblyMaterialInput {
            material_id: stud,
            quantity: dec!(4),
        };
        assemblies.upsert_material(id, line.clone()).await.unwrap();
        let updated = assemblies
            .upsert_material(
                id,
                AssemblyMaterialInput {
                    quantity: dec!(6),
                    ..line
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quantity, dec!(6));
        assert_eq!(assemblies.get_assembly(id).await.unwrap().materials.len(), 1);

        assemblies.remove_material(id, stud).await.unwrap();
        assert_matches!(
            assemblies.remove_material(id, stud).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn material_in_use_cannot_be_deleted() {
        let (assemblies, materials) = setup().await;
        let stud = material(&materials, "Stud", dec!(2.25)).await;
        assemblies
            .create_assembly(CreateAssemblyInput {
                name: "Frame".into(),
                description: None,
                category_id: None,
                labor_cost: Decimal::ZERO,
                materials: vec![AssemblyMaterialInput {
                    material_id: stud,
                    quantity: dec!(1),
                }],
            })
            .await
            .unwrap();

        assert_matches!(
            materials.delete_material(stud).await,
            Err(ServiceError::Conflict(_))
        );
    }
}
