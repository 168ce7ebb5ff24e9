//! Property-based tests over the engine's pure decision functions.
//!
//! These use proptest to pin down invariants of the buffer math, the debt
//! settlement track, WIP band derivation, variant selection odds and the
//! explosion roll-up across a wide range of inputs.

use proptest::prelude::*;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use ppic_api::entities::bom_variant::{self, VariantApproval, VariantType};
use ppic_api::entities::manufacturing_order::MoStatus;
use ppic_api::entities::material_debt::{self, DebtApprovalStatus, DebtStatus};
use ppic_api::entities::spk::SpkStatus;
use ppic_api::entities::wip_buffer::{derive_status, WipStatus};
use ppic_api::entities::Department;
use ppic_api::errors::ServiceError;
use ppic_api::services::bom_resolver::{roll_up, selection_probabilities, ExplosionNode};
use ppic_api::services::release::compute_final_qty;

// Strategies for generating test data
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..20_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn buffer_percent_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=1000).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn spk_status_strategy() -> impl Strategy<Value = SpkStatus> {
    prop_oneof![
        Just(SpkStatus::Pending),
        Just(SpkStatus::InProgress),
        Just(SpkStatus::Done),
        Just(SpkStatus::Cancelled),
    ]
}

fn mo_status_strategy() -> impl Strategy<Value = MoStatus> {
    prop_oneof![
        Just(MoStatus::Draft),
        Just(MoStatus::Partial),
        Just(MoStatus::ReleasedPendingFanout),
        Just(MoStatus::Released),
        Just(MoStatus::Completed),
    ]
}

// Property: the buffer never shrinks an order and stays within its 10% cap
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn buffered_qty_never_shrinks_the_order(
        target in 0i32..2_000_000,
        percent in buffer_percent_strategy(),
    ) {
        let final_qty = compute_final_qty(target, percent).unwrap();
        prop_assert!(final_qty >= target, "buffer shrank {} to {}", target, final_qty);
        prop_assert!(
            final_qty <= target + target / 10 + 1,
            "buffer overshot the 10% cap: {} -> {}",
            target,
            final_qty
        );
    }

    #[test]
    fn zero_buffer_is_identity(target in 0i32..2_000_000) {
        prop_assert_eq!(compute_final_qty(target, Decimal::ZERO).unwrap(), target);
    }

    #[test]
    fn buffered_qty_grows_with_the_order(
        target in 0i32..1_000_000,
        percent in buffer_percent_strategy(),
    ) {
        let smaller = compute_final_qty(target, percent).unwrap();
        let larger = compute_final_qty(target + 1, percent).unwrap();
        prop_assert!(larger > smaller, "{} -> {} vs {} -> {}", target, smaller, target + 1, larger);
    }

    #[test]
    fn out_of_range_buffer_is_rejected(
        hundredths in prop_oneof![-100_000i64..0, 1001i64..100_000],
    ) {
        let percent = Decimal::new(hundredths, 2);
        let result = compute_final_qty(1000, percent);
        prop_assert!(
            matches!(result, Err(ServiceError::OutOfRange(_))),
            "percent {} was accepted",
            percent
        );
    }
}

// Property: the settlement track is a pure function of the two quantities
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn settlement_track_matches_the_quantities(
        owed in quantity_strategy(),
        settled_cents in 0i64..40_000_000,
    ) {
        let settled = Decimal::new(settled_cents, 2);
        match DebtStatus::derive(owed, settled) {
            DebtStatus::Open => prop_assert!(settled.is_zero()),
            DebtStatus::PartialResolved => {
                prop_assert!(settled > Decimal::ZERO && settled < owed)
            }
            DebtStatus::FullyResolved => prop_assert_eq!(settled, owed),
            DebtStatus::Excess => prop_assert!(settled > owed),
        }
    }

    #[test]
    fn settlement_progress_never_moves_backwards(
        owed in quantity_strategy(),
        settled_cents in 0i64..40_000_000,
        delta_cents in 0i64..10_000_000,
    ) {
        let before = DebtStatus::derive(owed, Decimal::new(settled_cents, 2));
        let after = DebtStatus::derive(owed, Decimal::new(settled_cents + delta_cents, 2));
        prop_assert!(
            track_rank(after) >= track_rank(before),
            "settling more moved the track from {:?} to {:?}",
            before,
            after
        );
    }

    #[test]
    fn remaining_and_excess_partition_the_quantities(
        owed in quantity_strategy(),
        settled_cents in 0i64..40_000_000,
    ) {
        let debt = debt_model(owed, Decimal::new(settled_cents, 2));
        // At most one side of the ledger is ever non-zero.
        prop_assert!(
            debt.remaining_debt() == Decimal::ZERO || debt.excess_qty() == Decimal::ZERO
        );
        prop_assert_eq!(
            debt.qty_owed - debt.qty_settled,
            debt.remaining_debt() - debt.excess_qty()
        );
    }
}

// Property: WIP bands only improve as the buffer fills
proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn negative_stock_is_always_the_negative_band(
        stock in i32::MIN..0,
        target in any::<i32>(),
    ) {
        prop_assert_eq!(derive_status(stock, target), WipStatus::Negative);
    }

    #[test]
    fn bands_improve_with_stock(
        target in 1i32..1_000_000,
        stock in 0i32..2_000_000,
        delta in 1i32..10_000,
    ) {
        let before = derive_status(stock, target);
        let after = derive_status(stock + delta, target);
        prop_assert!(
            band_rank(after) >= band_rank(before),
            "adding stock moved the band from {:?} to {:?}",
            before,
            after
        );
    }

    #[test]
    fn meeting_half_the_target_is_abundant(
        target in 1i32..1_000_000,
        surplus in 0i32..1_000_000,
    ) {
        let stock = target / 2 + target % 2 + surplus;
        prop_assert_eq!(derive_status(stock, target), WipStatus::Abundant);
    }
}

// Property: selection odds cover the whole draw and ignore ineligible variants
proptest! {
    #[test]
    fn probabilities_cover_the_whole_draw(
        weights in prop::collection::vec(1i32..10_000, 1..16),
    ) {
        let variants: Vec<bom_variant::Model> = weights
            .iter()
            .enumerate()
            .map(|(seq, &weight)| variant(weight, true, seq as i32))
            .collect();

        let shares = selection_probabilities(&variants);
        prop_assert_eq!(shares.len(), variants.len());

        let total: Decimal = shares.iter().map(|(_, share)| *share).sum();
        let drift = (total - dec!(100)).abs();
        prop_assert!(drift <= dec!(0.1), "shares sum to {}", total);
    }

    #[test]
    fn ineligible_variants_never_shift_the_odds(
        weights in prop::collection::vec(1i32..10_000, 1..8),
        noise in prop::collection::vec(1i32..10_000, 0..8),
    ) {
        let mut variants: Vec<bom_variant::Model> = weights
            .iter()
            .enumerate()
            .map(|(seq, &weight)| variant(weight, true, seq as i32))
            .collect();
        let eligible_only = selection_probabilities(&variants);

        for (offset, &weight) in noise.iter().enumerate() {
            variants.push(variant(weight, false, (weights.len() + offset) as i32));
        }
        prop_assert_eq!(selection_probabilities(&variants), eligible_only);
    }

    #[test]
    fn no_eligible_variants_means_no_odds(
        noise in prop::collection::vec(1i32..10_000, 0..8),
    ) {
        let variants: Vec<bom_variant::Model> = noise
            .iter()
            .enumerate()
            .map(|(seq, &weight)| variant(weight, false, seq as i32))
            .collect();
        prop_assert!(selection_probabilities(&variants).is_empty());
    }
}

// Property: both lifecycles are forward-only
proptest! {
    #[test]
    fn spk_lifecycle_has_no_backward_edges(
        a in spk_status_strategy(),
        b in spk_status_strategy(),
    ) {
        prop_assert!(!a.can_transition_to(a));
        if a.can_transition_to(b) {
            prop_assert!(!b.can_transition_to(a), "{:?} <-> {:?} would be a cycle", a, b);
        }
    }

    #[test]
    fn closed_spks_accept_no_transition(next in spk_status_strategy()) {
        prop_assert!(!SpkStatus::Done.can_transition_to(next));
        prop_assert!(!SpkStatus::Cancelled.can_transition_to(next));
    }

    #[test]
    fn mo_lifecycle_is_a_forward_chain(
        a in mo_status_strategy(),
        b in mo_status_strategy(),
    ) {
        prop_assert!(!a.can_transition_to(a));
        if a.can_transition_to(b) {
            prop_assert_eq!(mo_chain_position(b), mo_chain_position(a) + 1);
        }
    }
}

// Property: roll-up conserves leaf demand and groups it uniquely
proptest! {
    #[test]
    fn roll_up_conserves_leaf_demand(
        rows in prop::collection::vec((0u128..5, 0usize..6, 1i64..100_000_000, any::<bool>()), 0..40),
    ) {
        let nodes: Vec<ExplosionNode> = rows
            .iter()
            .map(|&(material, dept, cents, leaf)| {
                node(material + 1, dept_from_index(dept), cents, leaf)
            })
            .collect();
        let rolled = roll_up(&nodes);

        let leaf_total: Decimal = nodes
            .iter()
            .filter(|n| n.is_leaf)
            .map(|n| n.qty_required)
            .sum();
        let rolled_total: Decimal = rolled.iter().map(|r| r.total_qty).sum();
        prop_assert_eq!(rolled_total, leaf_total);

        let keys: std::collections::HashSet<_> = rolled
            .iter()
            .map(|r| (r.material_id, r.department))
            .collect();
        prop_assert_eq!(keys.len(), rolled.len(), "duplicate (material, department) rows");
    }

    #[test]
    fn intermediates_never_reach_the_roll_up(
        rows in prop::collection::vec((0u128..5, 0usize..6, 1i64..100_000_000), 0..25),
    ) {
        let leaves: Vec<ExplosionNode> = rows
            .iter()
            .map(|&(material, dept, cents)| node(material + 1, dept_from_index(dept), cents, true))
            .collect();

        let mut with_intermediates = leaves.clone();
        for (slot, &(material, dept, cents)) in rows.iter().enumerate() {
            with_intermediates.insert(slot, node(material + 1, dept_from_index(dept), cents, false));
        }
        prop_assert_eq!(roll_up(&with_intermediates), roll_up(&leaves));
    }
}

// Builders and rank helpers

fn debt_model(qty_owed: Decimal, qty_settled: Decimal) -> material_debt::Model {
    let now = Utc::now();
    material_debt::Model {
        id: Uuid::new_v4(),
        spk_id: Uuid::new_v4(),
        material_id: Uuid::new_v4(),
        department: Department::Sewing,
        qty_owed,
        qty_settled,
        approval_status: DebtApprovalStatus::PendingApproval,
        debt_status: DebtStatus::derive(qty_owed, qty_settled),
        due_date: None,
        reason: "fabric consumed ahead of receipt".into(),
        allow_production_while_pending: true,
        requires_escalation: false,
        approval_notes: None,
        created_at: now,
        updated_at: now,
        version: 1,
    }
}

fn variant(weight: i32, eligible: bool, sequence: i32) -> bom_variant::Model {
    let now = Utc::now();
    bom_variant::Model {
        id: Uuid::new_v4(),
        detail_id: Uuid::nil(),
        material_id: Uuid::new_v4(),
        variant_type: VariantType::Alternative,
        sequence,
        qty_variance: None,
        qty_variance_percent: None,
        weight,
        cost_variance: None,
        is_active: eligible,
        approval_status: if eligible {
            VariantApproval::Approved
        } else {
            VariantApproval::Rejected
        },
        created_at: now,
        updated_at: now,
    }
}

fn node(material: u128, department: Option<Department>, cents: i64, is_leaf: bool) -> ExplosionNode {
    let qty = Decimal::new(cents, 2);
    ExplosionNode {
        product_id: Uuid::nil(),
        detail_id: Uuid::new_v4(),
        component_id: Uuid::from_u128(material),
        material_id: Uuid::from_u128(material),
        variant_id: None,
        level: 1,
        department,
        qty_base: qty,
        qty_required: qty,
        is_leaf,
    }
}

fn dept_from_index(index: usize) -> Option<Department> {
    if index == 0 {
        None
    } else {
        Some(Department::ALL[index - 1])
    }
}

fn track_rank(status: DebtStatus) -> u8 {
    match status {
        DebtStatus::Open => 0,
        DebtStatus::PartialResolved => 1,
        DebtStatus::FullyResolved => 2,
        DebtStatus::Excess => 3,
    }
}

fn band_rank(status: WipStatus) -> u8 {
    match status {
        WipStatus::Negative => 0,
        WipStatus::Critical => 1,
        WipStatus::Low => 2,
        WipStatus::Sufficient => 3,
        WipStatus::Abundant => 4,
    }
}

fn mo_chain_position(status: MoStatus) -> u8 {
    match status {
        MoStatus::Draft => 0,
        MoStatus::Partial => 1,
        MoStatus::ReleasedPendingFanout => 2,
        MoStatus::Released => 3,
        MoStatus::Completed => 4,
    }
}
