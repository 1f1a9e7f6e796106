//! Price roll-up over template → assembly → material trees.
//!
//! Everything here works on data that has already been loaded; the
//! database-facing services build the input trees and call in. Sums are kept
//! exact and only the figures placed in a breakdown are rounded.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;

/// One BOM line of an assembly with the material's current price.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedMaterial {
    pub material_id: Uuid,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
}

impl PricedMaterial {
    pub fn cost(&self) -> Result<Decimal, ServiceError> {
        mul(self.unit_price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedAssembly {
    pub assembly_id: Uuid,
    pub name: String,
    pub labor_cost: Decimal,
    pub materials: Vec<PricedMaterial>,
}

impl PricedAssembly {
    pub fn material_cost(&self) -> Result<Decimal, ServiceError> {
        self.materials
            .iter()
            .try_fold(Decimal::ZERO, |acc, m| add(acc, m.cost()?))
    }

    /// Cost of building one unit of the assembly.
    pub fn unit_cost(&self) -> Result<Decimal, ServiceError> {
        add(self.material_cost()?, self.labor_cost)
    }
}

/// An assembly placed on a template `quantity` times.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLine {
    pub assembly: PricedAssembly,
    pub quantity: Decimal,
    pub group_id: Option<Uuid>,
}

impl TemplateLine {
    pub fn cost(&self) -> Result<Decimal, ServiceError> {
        mul(self.assembly.unit_cost()?, self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MaterialCostLine {
    pub material_id: Uuid,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssemblyBreakdown {
    pub assembly_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub materials: Vec<MaterialCostLine>,
    pub material_cost: Decimal,
    pub labor_cost: Decimal,
    pub unit_cost: Decimal,
    pub quantity: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceBreakdown {
    pub lines: Vec<AssemblyBreakdown>,
    pub subtotal: Decimal,
    pub markup_percent: Decimal,
    pub markup_amount: Decimal,
    /// Price of one unit of the template, markup included
    pub unit_total: Decimal,
    /// Number of template units priced (a project's quantity)
    pub quantity: i32,
    pub total: Decimal,
    pub currency: String,
}

/// Summed requirement for one material across a whole tree.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TakeoffLine {
    pub material_id: Uuid,
    pub name: String,
    pub unit: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    pub total_cost: Decimal,
}

fn overflow() -> ServiceError {
    ServiceError::InvalidOperation("Price exceeds the supported numeric range".to_string())
}

pub(crate) fn mul(a: Decimal, b: Decimal) -> Result<Decimal, ServiceError> {
    a.checked_mul(b).ok_or_else(overflow)
}

pub(crate) fn add(a: Decimal, b: Decimal) -> Result<Decimal, ServiceError> {
    a.checked_add(b).ok_or_else(overflow)
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn template_subtotal(lines: &[TemplateLine]) -> Result<Decimal, ServiceError> {
    lines
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| add(acc, l.cost()?))
}

/// `subtotal × (1 + markup / 100)`, unrounded.
pub fn apply_markup(subtotal: Decimal, markup_percent: Decimal) -> Result<Decimal, ServiceError> {
    add(subtotal, markup_amount(subtotal, markup_percent)?)
}

fn markup_amount(subtotal: Decimal, markup_percent: Decimal) -> Result<Decimal, ServiceError> {
    Ok(mul(subtotal, markup_percent)? / Decimal::ONE_HUNDRED)
}

fn material_lines(
    assembly: &PricedAssembly,
    scale: Decimal,
) -> Result<Vec<MaterialCostLine>, ServiceError> {
    assembly
        .materials
        .iter()
        .map(|m| {
            Ok(MaterialCostLine {
                material_id: m.material_id,
                name: m.name.clone(),
                unit: m.unit.clone(),
                unit_price: m.unit_price,
                quantity: mul(m.quantity, scale)?,
                line_total: round_money(mul(m.cost()?, scale)?),
            })
        })
        .collect()
}

fn assembly_breakdown(
    assembly: &PricedAssembly,
    quantity: Decimal,
    group_id: Option<Uuid>,
) -> Result<AssemblyBreakdown, ServiceError> {
    let unit_cost = assembly.unit_cost()?;
    Ok(AssemblyBreakdown {
        assembly_id: assembly.assembly_id,
        name: assembly.name.clone(),
        group_id,
        materials: material_lines(assembly, Decimal::ONE)?,
        material_cost: round_money(assembly.material_cost()?),
        labor_cost: round_money(assembly.labor_cost),
        unit_cost: round_money(unit_cost),
        quantity,
        line_total: round_money(mul(unit_cost, quantity)?),
    })
}

/// Breakdown for a single assembly priced on its own.
pub fn price_assembly(assembly: &PricedAssembly) -> Result<AssemblyBreakdown, ServiceError> {
    assembly_breakdown(assembly, Decimal::ONE, None)
}

/// Rolls a template up to its total; `quantity` multiplies the marked-up
/// template price (1 for a bare template, the project quantity otherwise).
pub fn price_template(
    lines: &[TemplateLine],
    markup_percent: Decimal,
    quantity: i32,
    currency: &str,
) -> Result<PriceBreakdown, ServiceError> {
    let subtotal = template_subtotal(lines)?;
    let unit_total = apply_markup(subtotal, markup_percent)?;

    Ok(PriceBreakdown {
        lines: lines
            .iter()
            .map(|l| assembly_breakdown(&l.assembly, l.quantity, l.group_id))
            .collect::<Result<_, _>>()?,
        subtotal: round_money(subtotal),
        markup_percent,
        markup_amount: round_money(markup_amount(subtotal, markup_percent)?),
        unit_total: round_money(unit_total),
        quantity,
        total: round_money(mul(unit_total, Decimal::from(quantity))?),
        currency: currency.to_string(),
    })
}

/// Material take-off: every material's quantity multiplied down the tree and
/// summed, ordered by material name.
pub fn material_takeoff(
    lines: &[TemplateLine],
    quantity: i32,
) -> Result<Vec<TakeoffLine>, ServiceError> {
    let scale = Decimal::from(quantity);
    let mut totals: HashMap<Uuid, (PricedMaterial, Decimal)> = HashMap::new();

    for line in lines {
        for m in &line.assembly.materials {
            let needed = mul(mul(m.quantity, line.quantity)?, scale)?;
            match totals.get_mut(&m.material_id) {
                Some((_, q)) => *q = add(*q, needed)?,
                None => {
                    totals.insert(m.material_id, (m.clone(), needed));
                }
            }
        }
    }

    let mut takeoff = totals
        .into_values()
        .map(|(m, qty)| {
            Ok(TakeoffLine {
                material_id: m.material_id,
                total_cost: round_money(mul(m.unit_price, qty)?),
                name: m.name,
                unit: m.unit,
                unit_price: m.unit_price,
                quantity: qty,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;
    takeoff.sort_by(|a, b| a.name.cmp(&b.name).then(a.material_id.cmp(&b.material_id)));
    Ok(takeoff)
}
