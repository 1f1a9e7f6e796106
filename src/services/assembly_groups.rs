use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{clean, nullable};
use super::group_rules::RuleGroup;
use crate::{
    entities::{
        assembly::{self, Entity as AssemblyEntity},
        assembly_category::Entity as CategoryEntity,
        assembly_group::{self, Entity as GroupEntity, GroupRule},
        assembly_group_item::{self, conflict_ids_to_json, Entity as GroupItemEntity},
        template_group::{self, Entity as TemplateGroupEntity},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct GroupItemInput {
    pub assembly_id: Uuid,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub conflicts_with: Vec<Uuid>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateGroupInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub rule: GroupRule,
    #[serde(default)]
    pub items: Vec<GroupItemInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateGroupInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    /// `null` clears the category
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Uuid>, nullable)]
    pub category_id: Option<Option<Uuid>>,
    pub rule: Option<GroupRule>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateGroupItemInput {
    pub is_default: Option<bool>,
    pub conflicts_with: Option<Vec<Uuid>>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupItemView {
    pub id: Uuid,
    pub assembly_id: Uuid,
    pub assembly_name: String,
    pub is_default: bool,
    pub conflicts_with: Vec<Uuid>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: assembly_group::Model,
    pub items: Vec<GroupItemView>,
}

/// Loads groups with their items as rule inputs, in the order requested.
pub(crate) async fn load_rule_groups<C: ConnectionTrait>(
    conn: &C,
    group_ids: &[Uuid],
) -> Result<Vec<RuleGroup>, ServiceError> {
    if group_ids.is_empty() {
        return Ok(Vec::new());
    }

    let groups = GroupEntity::find()
        .filter(assembly_group::Column::Id.is_in(group_ids.to_vec()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if groups.len() != group_ids.iter().collect::<HashSet<_>>().len() {
        return Err(ServiceError::ValidationError(
            "One or more assembly groups do not exist".into(),
        ));
    }

    let items = GroupItemEntity::find()
        .filter(assembly_group_item::Column::GroupId.is_in(group_ids.to_vec()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let by_id: HashMap<Uuid, assembly_group::Model> =
        groups.into_iter().map(|g| (g.id, g)).collect();
    let mut seen = HashSet::new();
    Ok(group_ids
        .iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| by_id.get(id))
        .map(|g| RuleGroup::from_models(g, &items))
        .collect())
}

fn check_items(items: &[GroupItemInput], rule: GroupRule) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.assembly_id) {
            return Err(ServiceError::ValidationError(format!(
                "Assembly {} appears more than once in the group",
                item.assembly_id
            )));
        }
        if item.conflicts_with.contains(&item.assembly_id) {
            return Err(ServiceError::ValidationError(format!(
                "Assembly {} cannot conflict with itself",
                item.assembly_id
            )));
        }
    }
    check_defaults(items.iter().filter(|i| i.is_default).count(), rule)
}

fn check_defaults(defaults: usize, rule: GroupRule) -> Result<(), ServiceError> {
    if rule == GroupRule::ChooseOne && defaults > 1 {
        return Err(ServiceError::ValidationError(
            "A choose-one group can have at most one default item".into(),
        ));
    }
    Ok(())
}

async fn ensure_assemblies_exist<C: ConnectionTrait>(
    conn: &C,
    ids: HashSet<Uuid>,
) -> Result<(), ServiceError> {
    if ids.is_empty() {
        return Ok(());
    }
    let found = AssemblyEntity::find()
        .filter(assembly::Column::Id.is_in(ids.iter().copied().collect::<Vec<_>>()))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if found as usize != ids.len() {
        return Err(ServiceError::ValidationError(
            "One or more assemblies do not exist".into(),
        ));
    }
    Ok(())
}

fn referenced_assemblies<'a>(items: impl IntoIterator<Item = &'a GroupItemInput>) -> HashSet<Uuid> {
    items
        .into_iter()
        .flat_map(|i| std::iter::once(i.assembly_id).chain(i.conflicts_with.iter().copied()))
        .collect()
}

/// Assembly groups and their rule items
#[derive(Clone)]
pub struct AssemblyGroupService {
    db: Arc<DatabaseConnection>,
}

impl AssemblyGroupService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name, rule = %input.rule))]
    pub async fn create_group(&self, input: CreateGroupInput) -> Result<GroupDetail, ServiceError> {
        input.validate()?;
        check_items(&input.items, input.rule)?;
        ensure_assemblies_exist(&*self.db, referenced_assemblies(&input.items)).await?;
        if let Some(category_id) = input.category_id {
            CategoryEntity::find_by_id(category_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!("Category {} does not exist", category_id))
                })?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let group = assembly_group::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(clean(input.description)),
            category_id: Set(input.category_id),
            rule: Set(input.rule),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!("Failed to create assembly group: {}", e);
            ServiceError::db_error(e)
        })?;

        for (position, item) in input.items.iter().enumerate() {
            assembly_group_item::ActiveModel {
                group_id: Set(group.id),
                assembly_id: Set(item.assembly_id),
                is_default: Set(item.is_default),
                conflicts_with: Set(conflict_ids_to_json(&item.conflicts_with)),
                sort_order: Set(item.sort_order.unwrap_or(position as i32)),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        }
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(group_id = %group.id, "Assembly group created");
        self.get_group(group.id).await
    }

    pub async fn find_group(&self, id: Uuid) -> Result<assembly_group::Model, ServiceError> {
        GroupEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Assembly group", id))
    }

    #[instrument(skip(self))]
    pub async fn get_group(&self, id: Uuid) -> Result<GroupDetail, ServiceError> {
        let group = self.find_group(id).await?;
        let items = GroupItemEntity::find()
            .filter(assembly_group_item::Column::GroupId.eq(id))
            .order_by_asc(assembly_group_item::Column::SortOrder)
            .find_also_related(AssemblyEntity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(GroupDetail {
            group,
            items: items
                .into_iter()
                .map(|(item, assembly)| GroupItemView {
                    id: item.id,
                    assembly_id: item.assembly_id,
                    assembly_name: assembly.map(|a| a.name).unwrap_or_default(),
                    is_default: item.is_default,
                    conflicts_with: item.conflict_ids(),
                    sort_order: item.sort_order,
                })
                .collect(),
        })
    }

    pub async fn list_groups(
        &self,
        category_id: Option<Uuid>,
    ) -> Result<Vec<assembly_group::Model>, ServiceError> {
        let mut query = GroupEntity::find();
        if let Some(category_id) = category_id {
            query = query.filter(assembly_group::Column::CategoryId.eq(category_id));
        }
        query
            .order_by_asc(assembly_group::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self, input))]
    pub async fn update_group(
        &self,
        id: Uuid,
        input: UpdateGroupInput,
    ) -> Result<GroupDetail, ServiceError> {
        input.validate()?;
        let group = self.find_group(id).await?;

        if let Some(rule) = input.rule {
            let defaults = GroupItemEntity::find()
                .filter(assembly_group_item::Column::GroupId.eq(id))
                .filter(assembly_group_item::Column::IsDefault.eq(true))
                .count(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
            check_defaults(defaults as usize, rule)?;
        }

        let mut active: assembly_group::ActiveModel = group.into();
        if let Some(name) = input.name {
            active.name = Set(name.trim().to_string());
        }
        if input.description.is_some() {
            active.description = Set(clean(input.description));
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(rule) = input.rule {
            active.rule = Set(rule);
        }
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;
        self.get_group(id).await
    }

    /// Deletes a group that no template has attached.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: Uuid) -> Result<(), ServiceError> {
        self.find_group(id).await?;
        let attached = TemplateGroupEntity::find()
            .filter(template_group::Column::GroupId.eq(id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if attached > 0 {
            return Err(ServiceError::Conflict(format!(
                "Assembly group {} is attached to {} template(s)",
                id, attached
            )));
        }

        GroupEntity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        info!(group_id = %id, "Assembly group deleted");
        Ok(())
    }

    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        group_id: Uuid,
        input: GroupItemInput,
    ) -> Result<GroupDetail, ServiceError> {
        let group = self.find_group(group_id).await?;
        let current = GroupItemEntity::find()
            .filter(assembly_group_item::Column::GroupId.eq(group_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if current.iter().any(|i| i.assembly_id == input.assembly_id) {
            return Err(ServiceError::Conflict(format!(
                "Assembly {} is already in group {}",
                input.assembly_id, group_id
            )));
        }
        check_items(std::slice::from_ref(&input), group.rule)?;
        let defaults = current.iter().filter(|i| i.is_default).count() + usize::from(input.is_default);
        check_defaults(defaults, group.rule)?;
        ensure_assemblies_exist(&*self.db, referenced_assemblies([&input])).await?;

        let next_order = current.iter().map(|i| i.sort_order + 1).max().unwrap_or(0);
        assembly_group_item::ActiveModel {
            group_id: Set(group_id),
            assembly_id: Set(input.assembly_id),
            is_default: Set(input.is_default),
            conflicts_with: Set(conflict_ids_to_json(&input.conflicts_with)),
            sort_order: Set(input.sort_order.unwrap_or(next_order)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        self.get_group(group_id).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_item(
        &self,
        group_id: Uuid,
        item_id: Uuid,
        input: UpdateGroupItemInput,
    ) -> Result<GroupDetail, ServiceError> {
        let group = self.find_group(group_id).await?;
        let items = GroupItemEntity::find()
            .filter(assembly_group_item::Column::GroupId.eq(group_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let item = items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found("Assembly group item", item_id))?;

        if let Some(true) = input.is_default {
            let others = items.iter().filter(|i| i.is_default && i.id != item_id).count();
            check_defaults(others + 1, group.rule)?;
        }

        let mut active: assembly_group_item::ActiveModel = item.clone().into();
        if let Some(is_default) = input.is_default {
            active.is_default = Set(is_default);
        }
        if let Some(conflicts) = input.conflicts_with {
            if conflicts.contains(&item.assembly_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Assembly {} cannot conflict with itself",
                    item.assembly_id
                )));
            }
            ensure_assemblies_exist(&*self.db, conflicts.iter().copied().collect()).await?;
            active.conflicts_with = Set(conflict_ids_to_json(&conflicts));
        }
        if let Some(order) = input.sort_order {
            active.sort_order = Set(order);
        }
        active.update(&*self.db).await.map_err(ServiceError::db_error)?;

        self.get_group(group_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, group_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let result = GroupItemEntity::delete_many()
            .filter(assembly_group_item::Column::GroupId.eq(group_id))
            .filter(assembly_group_item::Column::Id.eq(item_id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Assembly group item", item_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;

    async fn assembly(db: &DatabaseConnection, name: &str) -> Uuid {
        assembly::ActiveModel {
            name: Set(name.into()),
            labor_cost: Set(Decimal::ZERO),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    fn item(assembly_id: Uuid, is_default: bool) -> GroupItemInput {
        GroupItemInput {
            assembly_id,
            is_default,
            conflicts_with: vec![],
            sort_order: None,
        }
    }

    #[tokio::test]
    async fn create_group_with_items_in_order() {
        let db = test_support::db().await;
        let service = AssemblyGroupService::new(db.clone());
        let shingles = assembly(&db, "Shingles").await;
        let metal = assembly(&db, "Metal roof").await;

        let mut metal_item = item(metal, false);
        metal_item.conflicts_with = vec![shingles];
        let group = service
            .create_group(CreateGroupInput {
                name: "Roof covering".into(),
                description: None,
                category_id: None,
                rule: GroupRule::ChooseOne,
                items: vec![item(shingles, true), metal_item],
            })
            .await
            .unwrap();

        assert_eq!(group.items.len(), 2);
        assert_eq!(group.items[0].assembly_name, "Shingles");
        assert_eq!(group.items[1].conflicts_with, vec![shingles]);
    }

    #[tokio::test]
    async fn choose_one_allows_single_default() {
        let db = test_support::db().await;
        let service = AssemblyGroupService::new(db.clone());
        let a = assembly(&db, "A").await;
        let b = assembly(&db, "B").await;

        let result = service
            .create_group(CreateGroupInput {
                name: "Pick".into(),
                description: None,
                category_id: None,
                rule: GroupRule::ChooseOne,
                items: vec![item(a, true), item(b, true)],
            })
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn duplicate_item_is_a_conflict() {
        let db = test_support::db().await;
        let service = AssemblyGroupService::new(db.clone());
        let a = assembly(&db, "A").await;
        let group = service
            .create_group(CreateGroupInput {
                name: "Extras".into(),
                description: None,
                category_id: None,
                rule: GroupRule::Optional,
                items: vec![item(a, false)],
            })
            .await
            .unwrap();

        assert_matches!(
            service.add_item(group.group.id, item(a, false)).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn load_rule_groups_rejects_unknown_ids() {
        let db = test_support::db().await;
        assert_matches!(
            load_rule_groups(&*db, &[Uuid::new_v4()]).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
