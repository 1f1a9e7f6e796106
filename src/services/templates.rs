use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::assemblies::load_priced_assemblies;
use super::assembly_groups::load_rule_groups;
use super::group_rules::{self, RuleViolation};
use super::pricing::{self, PriceBreakdown, TakeoffLine, TemplateLine};
use super::{clean, ilike, nullable, page_index, validate_markup, validate_line_quantity};
use crate::{
    entities::{
        assembly::{self, Entity as AssemblyEntity},
        assembly_category::Entity as CategoryEntity,
        project::{self, Entity as ProjectEntity},
        template::{self, Entity as TemplateEntity},
        template_assembly::{self, Entity as TemplateAssemblyEntity},
        template_group::{self, Entity as TemplateGroupEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TemplateLineInput {
    pub assembly_id: Uuid,
    #[validate(custom = "validate_line_quantity")]
    pub quantity: Decimal,
    /// Group the assembly was chosen from
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTemplateInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "validate_markup")]
    pub markup_percent: Decimal,
    #[serde(default)]
    pub assemblies: Vec<TemplateLineInput>,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTemplateInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    /// `null` clears the category
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub category_id: Option<Option<Uuid>>,
    #[validate(custom = "validate_markup")]
    pub markup_percent: Option<Decimal>,
    /// Replaces every line when present
    pub assemblies: Option<Vec<TemplateLineInput>>,
    /// Replaces the attached groups when present
    pub group_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ValidateSelectionInput {
    #[serde(default)]
    pub assemblies: Vec<TemplateLineInput>,
    #[serde(default)]
    pub group_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SelectionReport {
    pub valid: bool,
    pub violations: Vec<RuleViolation>,
    /// Default items of the groups, for pre-filling a selection
    pub default_assembly_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TemplateLineView {
    pub id: Uuid,
    pub assembly_id: Uuid,
    pub assembly_name: String,
    pub quantity: Decimal,
    pub group_id: Option<Uuid>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub template: template::Model,
    pub assemblies: Vec<TemplateLineView>,
    pub group_ids: Vec<Uuid>,
}

/// Loads a template's lines as a pricing tree, in sort order.
pub(crate) async fn load_template_lines<C: ConnectionTrait>(
    conn: &C,
    template_id: Uuid,
) -> Result<Vec<TemplateLine>, ServiceError> {
    let rows = TemplateAssemblyEntity::find()
        .filter(template_assembly::Column::TemplateId.eq(template_id))
        .order_by_asc(template_assembly::Column::SortOrder)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.assembly_id).collect();
    let priced = load_priced_assemblies(conn, &ids).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match priced.get(&row.assembly_id) {
            Some(assembly) => Some(TemplateLine {
                assembly: assembly.clone(),
                quantity: row.quantity,
                group_id: row.group_id,
            }),
            None => {
                warn!(line_id = %row.id, "template line points at a missing assembly");
                None
            }
        })
        .collect())
}

/// Validates a prospective set of lines against the groups attached to a
/// template. Structural problems are 400s; broken group rules come back as a
/// single `RuleViolation` error carrying every violation.
async fn check_selection<C: ConnectionTrait>(
    conn: &C,
    lines: &[TemplateLineInput],
    group_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let violations = collect_violations(conn, lines, group_ids).await?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::RuleViolation(violations))
    }
}

async fn collect_violations<C: ConnectionTrait>(
    conn: &C,
    lines: &[TemplateLineInput],
    group_ids: &[Uuid],
) -> Result<Vec<RuleViolation>, ServiceError> {
    for line in lines {
        line.validate()?;
    }
    let groups = load_rule_groups(conn, group_ids).await?;

    let assembly_ids: HashSet<Uuid> = lines.iter().map(|l| l.assembly_id).collect();
    if assembly_ids.len() != lines.len() {
        return Err(ServiceError::ValidationError(
            "An assembly can appear only once per template".into(),
        ));
    }
    if !assembly_ids.is_empty() {
        let found = AssemblyEntity::find()
            .filter(assembly::Column::Id.is_in(assembly_ids.iter().copied().collect::<Vec<_>>()))
            .count(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if found as usize != assembly_ids.len() {
            return Err(ServiceError::ValidationError(
                "One or more assemblies do not exist".into(),
            ));
        }
    }

    for line in lines {
        if let Some(group_id) = line.group_id {
            let group = groups.iter().find(|g| g.id == group_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Group {} is not attached to the template",
                    group_id
                ))
            })?;
            if !group.contains(line.assembly_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Assembly {} is not part of group '{}'",
                    line.assembly_id, group.name
                )));
            }
        }
    }

    Ok(group_rules::validate_selection(&groups, &assembly_ids))
}

async fn write_lines(
    txn: &DatabaseTransaction,
    template_id: Uuid,
    lines: &[TemplateLineInput],
) -> Result<(), ServiceError> {
    for (position, line) in lines.iter().enumerate() {
        template_assembly::ActiveModel {
            template_id: Set(template_id),
            assembly_id: Set(line.assembly_id),
            quantity: Set(line.quantity),
            group_id: Set(line.group_id),
            sort_order: Set(position as i32),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

async fn write_groups(
    txn: &DatabaseTransaction,
    template_id: Uuid,
    group_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    let unique = group_ids.iter().filter(|id| seen.insert(**id));
    for (position, group_id) in unique.enumerate() {
        template_group::ActiveModel {
            template_id: Set(template_id),
            group_id: Set(*group_id),
            sort_order: Set(position as i32),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Templates: priced blueprints made of assemblies under group rules
#[derive(Clone)]
pub struct TemplateService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    currency: String,
}

impl TemplateService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, currency: String) -> Self {
        Self {
            db,
            event_sender,
            currency,
        }
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

    #[instrument(skip(self, input), fields(name = %input.name, lines = input.assemblies.len()))]
    pub async fn create_template(
        &self,
        input: CreateTemplateInput,
    ) -> Result<TemplateDetail, ServiceError> {
        input.validate()?;
        self.ensure_category(input.category_id).await?;
        check_selection(&*self.db, &input.assemblies, &input.group_ids).await?;

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let created = template::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(clean(input.description)),
            category_id: Set(input.category_id),
            markup_percent: Set(input.markup_percent),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!("Failed to create template: {}", e);
            ServiceError::db_error(e)
        })?;
        write_lines(&txn, created.id, &input.assemblies).await?;
        write_groups(&txn, created.id, &input.group_ids).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(template_id = %created.id, "Template created");
        self.event_sender
            .send_or_log(Event::TemplateChanged(created.id))
            .await;
        self.get_template(created.id).await
    }

    pub async fn find_template(&self, id: Uuid) -> Result<template::Model, ServiceError> {
        TemplateEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Template", id))
    }

    async fn group_ids(&self, id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(TemplateGroupEntity::find()
            .filter(template_group::Column::TemplateId.eq(id))
            .order_by_asc(template_group::Column::SortOrder)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|g| g.group_id)
            .collect())
    }

    async fn line_inputs(&self, id: Uuid) -> Result<Vec<TemplateLineInput>, ServiceError> {
        Ok(TemplateAssemblyEntity::find()
            .filter(template_assembly::Column::TemplateId.eq(id))
            .order_by_asc(template_assembly::Column::SortOrder)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|l| TemplateLineInput {
                assembly_id: l.assembly_id,
                quantity: l.quantity,
                group_id: l.group_id,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_template(&self, id: Uuid) -> Result<TemplateDetail, ServiceError> {
        let template = self.find_template(id).await?;
        let lines = TemplateAssemblyEntity::find()
            .filter(template_assembly::Column::TemplateId.eq(id))
            .order_by_asc(template_assembly::Column::SortOrder)
            .find_also_related(AssemblyEntity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(TemplateDetail {
            template,
            assemblies: lines
                .into_iter()
                .map(|(line, assembly)| TemplateLineView {
                    id: line.id,
                    assembly_id: line.assembly_id,
                    assembly_name: assembly.map(|a| a.name).unwrap_or_default(),
                    quantity: line.quantity,
                    group_id: line.group_id,
                    sort_order: line.sort_order,
                })
                .collect(),
            group_ids: self.group_ids(id).await?,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_templates(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
        category_id: Option<Uuid>,
    ) -> Result<(Vec<template::Model>, u64), ServiceError> {
        let mut query = TemplateEntity::find();
        if let Some(term) = clean(search) {
            query = query.filter(ilike(template::Column::Name, &term));
        }
        if let Some(category_id) = category_id {
            query = query.filter(template::Column::CategoryId.eq(category_id));
        }

        let paginator = query
            .order_by_asc(template::Column::Name)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page_index(page))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Updates header fields and, when given, replaces lines and groups.
    /// The resulting selection is re-validated before anything is written.
    #[instrument(skip(self, input))]
    pub async fn update_template(
        &self,
        id: Uuid,
        input: UpdateTemplateInput,
    ) -> Result<TemplateDetail, ServiceError> {
        input.validate()?;
        let existing = self.find_template(id).await?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let replaces_tree = input.assemblies.is_some() || input.group_ids.is_some();
        let lines = match input.assemblies {
            Some(lines) => lines,
            None => self.line_inputs(id).await?,
        };
        let group_ids = match input.group_ids {
            Some(ids) => ids,
            None => self.group_ids(id).await?,
        };
        if replaces_tree {
            check_selection(&*self.db, &lines, &group_ids).await?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let mut active: template::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(markup) = input.markup_percent {
            active.markup_percent = Set(markup);
        }
        active.update(&txn).await.map_err(ServiceError::db_error)?;

        if replaces_tree {
            TemplateAssemblyEntity::delete_many()
                .filter(template_assembly::Column::TemplateId.eq(id))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            TemplateGroupEntity::delete_many()
                .filter(template_group::Column::TemplateId.eq(id))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            write_lines(&txn, id, &lines).await?;
            write_groups(&txn, id, &group_ids).await?;
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.event_sender.send_or_log(Event::TemplateChanged(id)).await;
        self.get_template(id).await
    }

    /// Deletes a template no project was created from.
    #[instrument(skip(self))]
    pub async fn delete_template(&self, id: Uuid) -> Result<(), ServiceError> {
        self.find_template(id).await?;
        let projects = ProjectEntity::find()
            .filter(project::Column::TemplateId.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if projects > 0 {
            return Err(ServiceError::Conflict(format!(
                "Template {} is used by {} project(s)",
                id, projects
            )));
        }

        TemplateEntity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(template_id = %id, "Template deleted");
        Ok(())
    }

    /// Dry-run of the group rules for a prospective selection.
    #[instrument(skip(self, input))]
    pub async fn validate_selection(
        &self,
        input: ValidateSelectionInput,
    ) -> Result<SelectionReport, ServiceError> {
        input.validate()?;
        let violations = collect_violations(&*self.db, &input.assemblies, &input.group_ids).await?;
        let groups = load_rule_groups(&*self.db, &input.group_ids).await?;
        Ok(SelectionReport {
            valid: violations.is_empty(),
            violations,
            default_assembly_ids: group_rules::default_selection(&groups),
        })
    }

    /// Price of one unit of the template.
    #[instrument(skip(self))]
    pub async fn price_template(&self, id: Uuid) -> Result<PriceBreakdown, ServiceError> {
        let template = self.find_template(id).await?;
        let lines = load_template_lines(&*self.db, id).await?;
        pricing::price_template(
            &lines,
            template.markup_percent,
            1,
            &self.currency,
        )
    }

    #[instrument(skip(self))]
    pub async fn material_takeoff(&self, id: Uuid) -> Result<Vec<TakeoffLine>, ServiceError> {
        self.find_template(id).await?;
        let lines = load_template_lines(&*self.db, id).await?;
        pricing::material_takeoff(&lines, 1)
    }

    /// Copies a template with its lines and attached groups.
    #[instrument(skip(self))]
    pub async fn duplicate_template(
        &self,
        id: Uuid,
        name: Option<String>,
    ) -> Result<TemplateDetail, ServiceError> {
        let source = self.find_template(id).await?;
        let lines = self.line_inputs(id).await?;
        let group_ids = self.group_ids(id).await?;
        let name = clean(name).unwrap_or_else(|| format!("{} (copy)", source.name));

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let copy = template::ActiveModel {
            name: Set(name),
            description: Set(source.description.clone()),
            category_id: Set(source.category_id),
            markup_percent: Set(source.markup_percent),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        write_lines(&txn, copy.id, &lines).await?;
        write_groups(&txn, copy.id, &group_ids).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(source_id = %id, template_id = %copy.id, "Template duplicated");
        self.get_template(copy.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::assembly_group::GroupRule;
    use crate::services::assemblies::{AssemblyMaterialInput, AssemblyService, CreateAssemblyInput};
    use crate::services::assembly_groups::{AssemblyGroupService, CreateGroupInput, GroupItemInput};
    use crate::services::materials::{CreateMaterialInput, MaterialService};
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    struct Catalog {
        templates: TemplateService,
        groups: AssemblyGroupService,
        shingles: Uuid,
        metal: Uuid,
        group: Uuid,
    }

    async fn catalog() -> Catalog {
        let db = test_support::db().await;
        let (events, _rx) = test_support::events();
        let materials = MaterialService::new(db.clone(), events.clone());
        let assemblies = AssemblyService::new(db.clone(), events.clone());
        let groups = AssemblyGroupService::new(db.clone());

        let sheet = materials
            .create_material(CreateMaterialInput {
                name: "Sheet".into(),
                sku: None,
                unit: "m2".into(),
                unit_price: dec!(12.5),
                description: None,
                supplier: None,
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for (name, qty) in [("Shingles", dec!(4)), ("Metal", dec!(2))] {
            let detail = assemblies
                .create_assembly(CreateAssemblyInput {
                    name: name.into(),
                    description: None,
                    category_id: None,
                    labor_cost: dec!(100),
                    materials: vec![AssemblyMaterialInput {
                        material_id: sheet.id,
                        quantity: qty,
                    }],
                })
                .await
                .unwrap();
            ids.push(detail.assembly.id);
        }

        let group = groups
            .create_group(CreateGroupInput {
                name: "Roof".into(),
                description: None,
                category_id: None,
                rule: GroupRule::ChooseOne,
                items: ids
                    .iter()
                    .map(|id| GroupItemInput {
                        assembly_id: *id,
                        is_default: *id == ids[0],
                        conflicts_with: vec![],
                        sort_order: None,
                    })
                    .collect(),
            })
            .await
            .unwrap();

        Catalog {
            templates: TemplateService::new(db, events, "USD".into()),
            groups,
            shingles: ids[0],
            metal: ids[1],
            group: group.group.id,
        }
    }

    fn line(assembly_id: Uuid, qty: Decimal) -> TemplateLineInput {
        TemplateLineInput {
            assembly_id,
            quantity: qty,
            group_id: None,
        }
    }

    fn template_input(c: &Catalog, lines: Vec<TemplateLineInput>) -> CreateTemplateInput {
        CreateTemplateInput {
            name: "Cabin".into(),
            description: None,
            category_id: None,
            markup_percent: dec!(10),
            assemblies: lines,
            group_ids: vec![c.group],
        }
    }

    #[tokio::test]
    async fn create_and_price_template() {
        let c = catalog().await;
        let created = c
            .templates
            .create_template(template_input(&c, vec![line(c.shingles, dec!(2))]))
            .await
            .unwrap();
        assert_eq!(created.group_ids, vec![c.group]);

        let price = c.templates.price_template(created.template.id).await.unwrap();
        // (4 × 12.5 + 100) × 2 = 300, +10%
        assert_eq!(price.subtotal, dec!(300));
        assert_eq!(price.total, dec!(330));

        let takeoff = c.templates.material_takeoff(created.template.id).await.unwrap();
        assert_eq!(takeoff[0].quantity, dec!(8));
    }

    #[tokio::test]
    async fn attached_groups_keep_their_order() {
        let c = catalog().await;
        let mut extra = Vec::new();
        for name in ["Gutters", "Vents", "Flashing"] {
            let group = c
                .groups
                .create_group(CreateGroupInput {
                    name: name.into(),
                    description: None,
                    category_id: None,
                    rule: GroupRule::Optional,
                    items: vec![],
                })
                .await
                .unwrap();
            extra.push(group.group.id);
        }
        let order = vec![extra[2], c.group, extra[0], extra[1]];

        let mut input = template_input(&c, vec![line(c.shingles, dec!(1))]);
        input.group_ids = order.clone();
        let created = c.templates.create_template(input).await.unwrap();
        assert_eq!(created.group_ids, order);

        let reordered = vec![extra[1], extra[0], c.group];
        let updated = c
            .templates
            .update_template(
                created.template.id,
                UpdateTemplateInput {
                    group_ids: Some(reordered.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.group_ids, reordered);

        let copy = c
            .templates
            .duplicate_template(created.template.id, None)
            .await
            .unwrap();
        assert_eq!(copy.group_ids, reordered);
    }

    #[tokio::test]
    async fn rule_violations_block_creation() {
        let c = catalog().await;
        let result = c
            .templates
            .create_template(template_input(
                &c,
                vec![line(c.shingles, dec!(1)), line(c.metal, dec!(1))],
            ))
            .await;
        assert_matches!(result, Err(ServiceError::RuleViolation(v)) if v.len() == 1);
    }

    #[tokio::test]
    async fn dry_run_reports_defaults() {
        let c = catalog().await;
        let report = c
            .templates
            .validate_selection(ValidateSelectionInput {
                assemblies: vec![],
                group_ids: vec![c.group],
            })
            .await
            .unwrap();
        assert!(!report.valid);
        assert_eq!(report.default_assembly_ids, vec![c.shingles]);
    }

    #[tokio::test]
    async fn line_group_must_be_attached() {
        let c = catalog().await;
        let mut input = template_input(&c, vec![line(c.shingles, dec!(1))]);
        input.assemblies[0].group_id = Some(c.group);
        input.group_ids.clear();
        assert_matches!(
            c.templates.create_template(input).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn update_revalidates_and_replaces_lines() {
        let c = catalog().await;
        let created = c
            .templates
            .create_template(template_input(&c, vec![line(c.shingles, dec!(1))]))
            .await
            .unwrap();

        let updated = c
            .templates
            .update_template(
                created.template.id,
                UpdateTemplateInput {
                    assemblies: Some(vec![line(c.metal, dec!(3))]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.assemblies.len(), 1);
        assert_eq!(updated.assemblies[0].assembly_id, c.metal);

        let broken = c
            .templates
            .update_template(
                created.template.id,
                UpdateTemplateInput {
                    assemblies: Some(vec![]),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(broken, Err(ServiceError::RuleViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_copies_lines_and_groups() {
        let c = catalog().await;
        let created = c
            .templates
            .create_template(template_input(&c, vec![line(c.shingles, dec!(2))]))
            .await
            .unwrap();

        let copy = c
            .templates
            .duplicate_template(created.template.id, None)
            .await
            .unwrap();
        assert_ne!(copy.template.id, created.template.id);
        assert_eq!(copy.template.name, "Cabin (copy)");
        assert_eq!(copy.assemblies.len(), 1);
        assert_eq!(copy.group_ids, vec![c.group]);
    }
}
