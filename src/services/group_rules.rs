//! Required / choose-one / optional / conflict checks for assembly groups.
//!
//! A *selection* is the set of assembly ids placed on a template. Each
//! attached group constrains how many of its items may be selected, and any
//! item may declare assemblies it cannot be combined with.

use serde::Serialize;
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    assembly_group::{self, GroupRule},
    assembly_group_item,
};

#[derive(Debug, Clone)]
pub struct RuleItem {
    pub assembly_id: Uuid,
    pub is_default: bool,
    pub sort_order: i32,
    pub conflicts_with: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub id: Uuid,
    pub name: String,
    pub rule: GroupRule,
    pub items: Vec<RuleItem>,
}

impl RuleGroup {
    pub fn from_models(group: &assembly_group::Model, items: &[assembly_group_item::Model]) -> Self {
        let mut items: Vec<RuleItem> = items
            .iter()
            .filter(|i| i.group_id == group.id)
            .map(|i| RuleItem {
                assembly_id: i.assembly_id,
                is_default: i.is_default,
                sort_order: i.sort_order,
                conflicts_with: i.conflict_ids(),
            })
            .collect();
        items.sort_by_key(|i| i.sort_order);

        Self {
            id: group.id,
            name: group.name.clone(),
            rule: group.rule,
            items,
        }
    }

    pub fn contains(&self, assembly_id: Uuid) -> bool {
        self.items.iter().any(|i| i.assembly_id == assembly_id)
    }

    fn assembly_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.assembly_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRequired,
    NotExactlyOne,
    Conflict,
}

/// One broken group rule. `assembly_ids` names the assemblies involved: the
/// candidates when nothing was picked, otherwise the offending selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RuleViolation {
    pub group_id: Uuid,
    pub group_name: String,
    pub rule: GroupRule,
    pub kind: ViolationKind,
    pub assembly_ids: Vec<Uuid>,
    pub message: String,
}

/// Checks `selection` against every group and returns all violations;
/// an empty vector means the selection is valid.
pub fn validate_selection(groups: &[RuleGroup], selection: &HashSet<Uuid>) -> Vec<RuleViolation> {
    let mut violations = Vec::new();

    for group in groups {
        let picked: Vec<Uuid> = group
            .items
            .iter()
            .map(|i| i.assembly_id)
            .filter(|id| selection.contains(id))
            .collect();

        match group.rule {
            GroupRule::Required if picked.is_empty() => violations.push(RuleViolation {
                group_id: group.id,
                group_name: group.name.clone(),
                rule: group.rule,
                kind: ViolationKind::MissingRequired,
                assembly_ids: group.assembly_ids(),
                message: format!("At least one assembly from '{}' must be selected", group.name),
            }),
            GroupRule::ChooseOne if picked.len() != 1 => violations.push(RuleViolation {
                group_id: group.id,
                group_name: group.name.clone(),
                rule: group.rule,
                kind: ViolationKind::NotExactlyOne,
                message: format!(
                    "Exactly one assembly from '{}' must be selected, found {}",
                    group.name,
                    picked.len()
                ),
                assembly_ids: if picked.is_empty() {
                    group.assembly_ids()
                } else {
                    picked
                },
            }),
            _ => {}
        }
    }

    let mut reported: HashSet<(Uuid, Uuid)> = HashSet::new();
    for group in groups {
        for item in group.items.iter().filter(|i| selection.contains(&i.assembly_id)) {
            for &other in &item.conflicts_with {
                if other == item.assembly_id || !selection.contains(&other) {
                    continue;
                }
                let pair = if item.assembly_id < other {
                    (item.assembly_id, other)
                } else {
                    (other, item.assembly_id)
                };
                if !reported.insert(pair) {
                    continue;
                }
                violations.push(RuleViolation {
                    group_id: group.id,
                    group_name: group.name.clone(),
                    rule: group.rule,
                    kind: ViolationKind::Conflict,
                    assembly_ids: vec![pair.0, pair.1],
                    message: format!(
                        "Assemblies {} and {} cannot be selected together",
                        pair.0, pair.1
                    ),
                });
            }
        }
    }

    violations
}

/// The `is_default` items of each group; a choose-one group contributes only
/// its first default by sort order.
pub fn default_selection(groups: &[RuleGroup]) -> Vec<Uuid> {
    let mut selected = Vec::new();
    for group in groups {
        let mut defaults: Vec<&RuleItem> = group.items.iter().filter(|i| i.is_default).collect();
        defaults.sort_by_key(|i| i.sort_order);
        match group.rule {
            GroupRule::ChooseOne => selected.extend(defaults.first().map(|i| i.assembly_id)),
            _ => selected.extend(defaults.iter().map(|i| i.assembly_id)),
        }
    }
    let mut seen = HashSet::new();
    selected.retain(|id| seen.insert(*id));
    selected
}
