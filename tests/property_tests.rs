//! Property-based tests for pricing, group rules and input normalization.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use std::collections::HashSet;

use bomflow_api::entities::assembly_group::GroupRule;
use bomflow_api::notifications::normalize_phone;
use bomflow_api::services::group_rules::{
    default_selection, validate_selection, RuleGroup, RuleItem, ViolationKind,
};
use bomflow_api::services::pricing::{
    apply_markup, material_takeoff, price_template, round_money, template_subtotal,
    PricedAssembly, PricedMaterial, TemplateLine,
};
use bomflow_api::services::uploads::sanitize_filename;
use bomflow_api::services::{
    MAX_AMOUNT, MAX_LINE_QUANTITY, MAX_MARKUP_PERCENT, MAX_PROJECT_QUANTITY,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000, 0u32..100).prop_map(|(units, cents)| Decimal::new(units * 100 + cents as i64, 2))
}

fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000).prop_map(|q| Decimal::new(q, 2))
}

fn material_strategy() -> impl Strategy<Value = PricedMaterial> {
    (price_strategy(), quantity_strategy(), "[a-z]{3,10}").prop_map(|(price, qty, name)| {
        PricedMaterial {
            material_id: Uuid::new_v4(),
            name,
            unit: "pcs".into(),
            unit_price: price,
            quantity: qty,
        }
    })
}

fn assembly_strategy() -> impl Strategy<Value = PricedAssembly> {
    (prop::collection::vec(material_strategy(), 0..6), price_strategy()).prop_map(
        |(materials, labor)| PricedAssembly {
            assembly_id: Uuid::new_v4(),
            name: "assembly".into(),
            labor_cost: labor,
            materials,
        },
    )
}

fn lines_strategy() -> impl Strategy<Value = Vec<TemplateLine>> {
    prop::collection::vec(
        (assembly_strategy(), quantity_strategy()).prop_map(|(assembly, quantity)| TemplateLine {
            assembly,
            quantity,
            group_id: None,
        }),
        0..5,
    )
}

fn markup_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..5_000).prop_map(|m| Decimal::new(m, 1))
}

// Property: price roll-up is consistent with its parts
proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn subtotal_is_sum_of_line_costs(lines in lines_strategy()) {
        let expected: Decimal = lines
            .iter()
            .map(|l| {
                let materials: Decimal = l.assembly.materials.iter().map(|m| m.unit_price * m.quantity).sum();
                (materials + l.assembly.labor_cost) * l.quantity
            })
            .sum();
        prop_assert_eq!(template_subtotal(&lines).unwrap(), expected);
    }

    #[test]
    fn markup_never_lowers_the_price(lines in lines_strategy(), markup in markup_strategy()) {
        let subtotal = template_subtotal(&lines).unwrap();
        prop_assert!(apply_markup(subtotal, markup).unwrap() >= subtotal);
    }

    #[test]
    fn total_scales_with_quantity(
        lines in lines_strategy(),
        markup in markup_strategy(),
        quantity in 1i32..50,
    ) {
        let one = price_template(&lines, markup, 1, "USD").unwrap();
        let many = price_template(&lines, markup, quantity, "USD").unwrap();
        let exact = apply_markup(template_subtotal(&lines).unwrap(), markup).unwrap() * Decimal::from(quantity);

        prop_assert_eq!(many.total, round_money(exact));
        prop_assert_eq!(many.unit_total, one.unit_total);
        prop_assert_eq!(many.quantity, quantity);
        prop_assert!(many.total >= Decimal::ZERO);
    }

    #[test]
    fn money_figures_have_at_most_two_decimals(lines in lines_strategy(), markup in markup_strategy()) {
        let breakdown = price_template(&lines, markup, 3, "USD").unwrap();
        for value in [breakdown.subtotal, breakdown.markup_amount, breakdown.unit_total, breakdown.total] {
            prop_assert!(value.scale() <= 2, "{} has more than two decimals", value);
        }
    }

    #[test]
    fn takeoff_conserves_material_quantities(lines in lines_strategy(), quantity in 1i32..20) {
        let takeoff = material_takeoff(&lines, quantity).unwrap();
        let expected: Decimal = lines
            .iter()
            .flat_map(|l| l.assembly.materials.iter().map(move |m| m.quantity * l.quantity))
            .sum::<Decimal>()
            * Decimal::from(quantity);
        let summed: Decimal = takeoff.iter().map(|t| t.quantity).sum();
        prop_assert_eq!(summed, expected);

        let ids: HashSet<Uuid> = takeoff.iter().map(|t| t.material_id).collect();
        prop_assert_eq!(ids.len(), takeoff.len(), "each material appears once");
    }
}

// Inputs anywhere in the accepted range, with the upper bounds drawn often
fn bounded_price_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(MAX_AMOUNT),
        (0i64..=10_000_000_000_000).prop_map(|raw| Decimal::new(raw, 4)),
    ]
}

fn bounded_quantity_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(MAX_LINE_QUANTITY),
        (1i64..=10_000_000_000).prop_map(|raw| Decimal::new(raw, 4)),
    ]
}

fn bounded_lines_strategy() -> impl Strategy<Value = Vec<TemplateLine>> {
    let material = (bounded_price_strategy(), bounded_quantity_strategy()).prop_map(|(price, qty)| {
        PricedMaterial {
            material_id: Uuid::new_v4(),
            name: "material".into(),
            unit: "pcs".into(),
            unit_price: price,
            quantity: qty,
        }
    });
    let assembly = (prop::collection::vec(material, 0..6), bounded_price_strategy()).prop_map(
        |(materials, labor)| PricedAssembly {
            assembly_id: Uuid::new_v4(),
            name: "assembly".into(),
            labor_cost: labor,
            materials,
        },
    );
    prop::collection::vec(
        (assembly, bounded_quantity_strategy()).prop_map(|(assembly, quantity)| TemplateLine {
            assembly,
            quantity,
            group_id: None,
        }),
        0..5,
    )
}

// Property: accepted inputs never overflow the roll-up
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn bounded_inputs_always_price(
        lines in bounded_lines_strategy(),
        markup in prop_oneof![Just(MAX_MARKUP_PERCENT), (0i64..=10_000_000).prop_map(|m| Decimal::new(m, 4))],
        quantity in prop_oneof![Just(MAX_PROJECT_QUANTITY), 1i32..=MAX_PROJECT_QUANTITY],
    ) {
        let priced = price_template(&lines, markup, quantity, "USD");
        prop_assert!(priced.is_ok(), "{:?}", priced.err());
        prop_assert!(material_takeoff(&lines, quantity).is_ok());
    }

    #[test]
    fn overflow_surfaces_as_an_error(factor in 2i64..1_000) {
        let lines = vec![TemplateLine {
            assembly: PricedAssembly {
                assembly_id: Uuid::new_v4(),
                name: "assembly".into(),
                labor_cost: Decimal::ZERO,
                materials: vec![PricedMaterial {
                    material_id: Uuid::new_v4(),
                    name: "material".into(),
                    unit: "pcs".into(),
                    unit_price: Decimal::MAX,
                    quantity: Decimal::from(factor),
                }],
            },
            quantity: Decimal::ONE,
            group_id: None,
        }];
        prop_assert!(price_template(&lines, Decimal::ZERO, 1, "USD").is_err());
        prop_assert!(material_takeoff(&lines, 1).is_err());
    }
}

fn group(rule: GroupRule, size: usize) -> RuleGroup {
    RuleGroup {
        id: Uuid::new_v4(),
        name: format!("{:?} group", rule),
        rule,
        items: (0..size)
            .map(|i| RuleItem {
                assembly_id: Uuid::new_v4(),
                is_default: i == 0,
                sort_order: i as i32,
                conflicts_with: Vec::new(),
            })
            .collect(),
    }
}

fn rule_strategy() -> impl Strategy<Value = GroupRule> {
    prop_oneof![
        Just(GroupRule::Required),
        Just(GroupRule::ChooseOne),
        Just(GroupRule::Optional),
    ]
}

// Property: group rules
proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn optional_groups_never_complain(size in 1usize..6, mask in prop::collection::vec(any::<bool>(), 6)) {
        let g = group(GroupRule::Optional, size);
        let selection: HashSet<Uuid> = g
            .items
            .iter()
            .zip(mask)
            .filter(|(_, keep)| *keep)
            .map(|(i, _)| i.assembly_id)
            .collect();
        prop_assert!(validate_selection(&[g], &selection).is_empty());
    }

    #[test]
    fn choose_one_accepts_exactly_one(size in 1usize..6, pick in 0usize..6, extra in 0usize..6) {
        let g = group(GroupRule::ChooseOne, size);
        let first = g.items[pick % size].assembly_id;
        let second = g.items[extra % size].assembly_id;
        let selection: HashSet<Uuid> = [first, second].into_iter().collect();

        let violations = validate_selection(std::slice::from_ref(&g), &selection);
        if selection.len() == 1 {
            prop_assert!(violations.is_empty());
        } else {
            prop_assert_eq!(violations.len(), 1);
            prop_assert_eq!(violations[0].kind, ViolationKind::NotExactlyOne);
        }
    }

    #[test]
    fn defaults_satisfy_cardinality_rules(rules in prop::collection::vec(rule_strategy(), 1..5), size in 1usize..5) {
        let groups: Vec<RuleGroup> = rules.into_iter().map(|r| group(r, size)).collect();
        let selection: HashSet<Uuid> = default_selection(&groups).into_iter().collect();
        prop_assert!(validate_selection(&groups, &selection).is_empty());
    }

    #[test]
    fn conflict_is_reported_once_per_pair(size in 2usize..6) {
        let mut g = group(GroupRule::Optional, size);
        let a = g.items[0].assembly_id;
        let b = g.items[1].assembly_id;
        g.items[0].conflicts_with = vec![b];
        g.items[1].conflicts_with = vec![a];

        let selection: HashSet<Uuid> = [a, b].into_iter().collect();
        let violations = validate_selection(&[g], &selection);
        prop_assert_eq!(violations.len(), 1);
        prop_assert_eq!(violations[0].kind, ViolationKind::Conflict);
    }
}

// Property: input normalization
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn formatted_numbers_normalize_to_digits(cc in 1u32..999, rest in "[0-9]{7,10}") {
        let formatted = format!("+{} ({}) {}-{}", cc, &rest[..3], &rest[3..5], &rest[5..]);
        let normalized = normalize_phone(&formatted);
        let digits = format!("{}{}", cc, rest);
        if digits.len() <= 15 {
            prop_assert_eq!(normalized.unwrap(), format!("+{}", digits));
        } else {
            prop_assert!(normalized.is_err());
        }
    }

    #[test]
    fn letters_are_rejected(prefix in "[0-9]{8,10}", letter in "[a-zA-Z]") {
        let raw = format!("{}{}", prefix, letter);
        prop_assert!(normalize_phone(&raw).is_err(), "accepted {}", raw);
    }

    #[test]
    fn sanitized_names_are_plain_file_names(name in "\\PC{0,300}") {
        let clean = sanitize_filename(&name);
        prop_assert!(!clean.is_empty());
        prop_assert!(!clean.contains('/') && !clean.contains('\\'));
        prop_assert!(!clean.starts_with('.'));
        prop_assert!(clean.chars().count() <= 200);
        prop_assert!(!clean.chars().any(char::is_control));
    }
}
