mod common;

use assert_matches::assert_matches;
use common::TestEngine;
use ppic_api::{
    auth::Role,
    entities::{
        department::Department,
        manufacturing_order::MoStatus,
        material_allocation::AllocationStatus,
        purchase_order::PoKind,
        spk::SpkStatus,
    },
    errors::ServiceError,
    events::Event,
    services::{po_registry::CreatePoInput, release::CreateMoInput},
};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn mo_creation_takes_target_from_label_and_applies_buffer() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(1000, dec!(3)).await;

    assert_eq!(mo.status, MoStatus::Draft);
    assert_eq!(mo.target_qty, 1000);
    assert_eq!(mo.buffer_percent, dec!(3));
    assert_eq!(mo.final_qty, 1030);
    assert!(mo.order_number.starts_with("MO-"));
    assert_eq!(mo.week.as_deref(), Some("W34"));
    assert_eq!(mo.destination.as_deref(), Some("JAKARTA"));

    // The label is consumed and cannot back a second order.
    let label = engine.pos.get_po(&mo.po_label_id).await.unwrap().unwrap();
    assert_eq!(label.consumed_by_mo, Some(mo.id));

    let err = engine
        .release
        .create_mo(CreateMoInput {
            article_id: Uuid::new_v4(),
            article_code: common::article_code(),
            po_label_id: label.id,
            buffer_percent: None,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::AlreadyBound(_));
}

#[tokio::test]
async fn unreceived_label_cannot_back_an_order() {
    let engine = TestEngine::new().await;
    let label = engine
        .pos
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Label,
            qty: 500,
            week: Some("W10".to_string()),
            destination: Some("BANDUNG".to_string()),
        })
        .await
        .unwrap();

    let err = engine
        .release
        .create_mo(CreateMoInput {
            article_id: Uuid::new_v4(),
            article_code: common::article_code(),
            po_label_id: label.id,
            buffer_percent: None,
            created_by: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionNotMet(_));
}

#[tokio::test]
async fn fabric_binding_rules() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(100, dec!(0)).await;

    // A label PO cannot stand in for fabric.
    let second_label = engine.received_po(PoKind::Label, 100).await;
    assert_matches!(
        engine.release.bind_po_kain(&mo.id, &second_label.id).await,
        Err(ServiceError::ValidationError(_))
    );

    // Cancelled fabric is refused.
    let cancelled = engine
        .pos
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Kain,
            qty: 100,
            week: None,
            destination: None,
        })
        .await
        .unwrap();
    engine.pos.cancel_po(&cancelled.id).await.unwrap();
    assert_matches!(
        engine.release.bind_po_kain(&mo.id, &cancelled.id).await,
        Err(ServiceError::InvalidState(_))
    );

    // An issued, not yet received fabric PO binds fine.
    let kain = engine
        .pos
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Kain,
            qty: 100,
            week: None,
            destination: None,
        })
        .await
        .unwrap();
    let mo = engine.release.bind_po_kain(&mo.id, &kain.id).await.unwrap();
    assert_eq!(mo.po_kain_id, Some(kain.id));

    // Re-binding the same PO is a no-op; a different one is refused.
    engine.release.bind_po_kain(&mo.id, &kain.id).await.unwrap();
    let other = engine.received_po(PoKind::Kain, 100).await;
    assert_matches!(
        engine.release.bind_po_kain(&mo.id, &other.id).await,
        Err(ServiceError::AlreadyBound(_))
    );
}

#[tokio::test]
async fn partial_release_needs_a_received_fabric_po() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(800, dec!(0)).await;

    // No fabric PO bound at all.
    let err = engine
        .release
        .release_partial(&mo.id, Role::Spv)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionNotMet(_));

    // Bound but still ISSUED.
    let kain = engine
        .pos
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Kain,
            qty: 800,
            week: None,
            destination: None,
        })
        .await
        .unwrap();
    engine.release.bind_po_kain(&mo.id, &kain.id).await.unwrap();
    let err = engine
        .release
        .release_partial(&mo.id, Role::Spv)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionNotMet(_));

    // Receiving the fabric unlocks the cut and embroidery fan-out.
    engine.pos.receive_po(&kain.id).await.unwrap();
    let mo = engine
        .release
        .release_partial(&mo.id, Role::Spv)
        .await
        .unwrap();
    assert_eq!(mo.status, MoStatus::Partial);
}

#[tokio::test]
async fn partial_release_fans_out_cutting_and_embroidery() {
    let engine = TestEngine::new().await;
    let mo = engine.partial_mo(1000, dec!(3)).await;

    let spks = engine.release.get_mo_spks(&mo.id).await.unwrap();
    assert_eq!(spks.len(), 2);
    assert_eq!(spks[0].department, Department::Cutting);
    assert_eq!(spks[1].department, Department::Embroidery);
    for spk in &spks {
        assert_eq!(spk.qty, 1030);
        assert_eq!(spk.status, SpkStatus::Pending);
        assert_eq!(spk.article_id, mo.article_id);
        assert_eq!(spk.article_code, mo.article_code);
    }

    let suffix = mo.order_number.trim_start_matches("MO-");
    assert_eq!(spks[0].spk_number, format!("SPK-CUT-{}", suffix));
    assert_eq!(spks[1].spk_number, format!("SPK-EMB-{}", suffix));
}

#[tokio::test]
async fn release_is_role_gated() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(400, dec!(0)).await;

    let err = engine
        .release
        .release_partial(&mo.id, Role::Operator)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::UnauthorizedTransition(_));

    // The refused call left no trace.
    let mo = engine.release.get_mo(&mo.id).await.unwrap().unwrap();
    assert_eq!(mo.status, MoStatus::Draft);
    assert!(engine.release.get_mo_spks(&mo.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_release_requires_the_partial_stage_first() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(600, dec!(0)).await;

    let err = engine
        .release
        .release_full(&mo.id, Role::Spv)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    // No side effects leaked from the refused release.
    let mo = engine.release.get_mo(&mo.id).await.unwrap().unwrap();
    assert_eq!(mo.status, MoStatus::Draft);
    assert!(engine.release.get_mo_spks(&mo.id).await.unwrap().is_empty());
    assert!(engine.ledger.get_allocations(&mo.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_release_unlocks_remaining_departments_and_allocates() {
    let engine = TestEngine::new().await;
    let mo = engine.partial_mo(1000, dec!(0)).await;
    let material_id = engine.seed_flat_bom(&mo.article_id).await;

    let mo = engine.release.release_full(&mo.id, Role::Spv).await.unwrap();
    assert_eq!(mo.status, MoStatus::Released);
    assert!(mo.allocation_requested_at.is_some());
    assert_eq!(mo.week.as_deref(), Some("W34"));
    assert_eq!(mo.destination.as_deref(), Some("JAKARTA"));

    let spks = engine.release.get_mo_spks(&mo.id).await.unwrap();
    let departments: Vec<Department> = spks.iter().map(|s| s.department).collect();
    assert_eq!(
        departments,
        vec![
            Department::Cutting,
            Department::Embroidery,
            Department::Sewing,
            Department::Finishing,
            Department::Packing,
        ]
    );

    // Two pieces of fabric per unit, no wastage: 2000 booked against the
    // warehouse.
    let allocations = engine.ledger.get_allocations(&mo.id).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].material_id, material_id);
    assert_eq!(allocations[0].qty, dec!(2000));
    assert_eq!(allocations[0].status, AllocationStatus::Committed);

    let (balances, total) = engine
        .ledger
        .get_balances(Some(material_id), None, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(balances[0].location, "WAREHOUSE");
    assert_eq!(balances[0].on_hand, dec!(-2000));
    assert_eq!(balances[0].allocated, dec!(2000));
}

#[tokio::test]
async fn full_release_without_a_bom_stays_redrivable() {
    let mut engine = TestEngine::new().await;
    let mo = engine.partial_mo(500, dec!(0)).await;

    // No BOM for the article: the allocation leg fails after the SPK legs
    // have landed.
    let err = engine
        .release
        .release_full(&mo.id, Role::Spv)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionNotMet(_));

    let stuck = engine.release.get_mo(&mo.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, MoStatus::ReleasedPendingFanout);
    assert_eq!(engine.release.get_mo_spks(&mo.id).await.unwrap().len(), 5);
    assert!(engine.ledger.get_allocations(&mo.id).await.unwrap().is_empty());

    let exhausted = engine.drain_events().into_iter().any(|event| {
        matches!(
            event,
            Event::FanoutRetryExhausted { mo_id, ref leg, .. }
                if mo_id == mo.id && leg.as_str() == "ALLOCATION"
        )
    });
    assert!(exhausted, "expected a retry-exhausted event for the allocation leg");

    // Seeding the BOM and re-driving finishes the release.
    engine.seed_flat_bom(&mo.article_id).await;
    let released = engine
        .release
        .redrive_fanout(&mo.id, Role::Spv)
        .await
        .unwrap();
    assert_eq!(released.status, MoStatus::Released);
    assert_eq!(engine.ledger.get_allocations(&mo.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_release_calls_do_not_duplicate_spks() {
    let engine = TestEngine::new().await;
    let mo = engine.partial_mo(700, dec!(0)).await;

    // A second partial release is refused outright.
    let err = engine
        .release
        .release_partial(&mo.id, Role::Spv)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    // Re-driving the partial stage finds both legs already landed.
    engine.release.redrive_fanout(&mo.id, Role::Spv).await.unwrap();
    engine.release.redrive_fanout(&mo.id, Role::Spv).await.unwrap();
    assert_eq!(engine.release.get_mo_spks(&mo.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn buffer_reshapes_pending_spks_until_full_release() {
    let engine = TestEngine::new().await;
    let mo = engine.partial_mo(1000, dec!(0)).await;
    assert_eq!(mo.final_qty, 1000);

    let mo = engine.release.apply_buffer(&mo.id, dec!(5)).await.unwrap();
    assert_eq!(mo.final_qty, 1050);
    let spks = engine.release.get_mo_spks(&mo.id).await.unwrap();
    assert!(spks.iter().all(|s| s.qty == 1050));

    // After full release the buffer is frozen.
    engine.seed_flat_bom(&mo.article_id).await;
    engine.release.release_full(&mo.id, Role::Spv).await.unwrap();
    let err = engine
        .release
        .apply_buffer(&mo.id, dec!(2))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));
}

#[tokio::test]
async fn buffer_percent_outside_the_band_is_refused() {
    let engine = TestEngine::new().await;
    let mo = engine.draft_mo(100, dec!(0)).await;

    assert_matches!(
        engine.release.apply_buffer(&mo.id, dec!(10.5)).await,
        Err(ServiceError::OutOfRange(_))
    );
    assert_matches!(
        engine.release.apply_buffer(&mo.id, dec!(-1)).await,
        Err(ServiceError::OutOfRange(_))
    );
}

#[tokio::test]
async fn completion_waits_for_every_spk_to_close() {
    let engine = TestEngine::new().await;
    let (mo, spks) = engine.released_mo(300).await;

    let err = engine.release.complete(&mo.id, Role::Spv).await.unwrap_err();
    assert_matches!(err, ServiceError::PreconditionNotMet(_));

    for spk in &spks {
        engine
            .release
            .update_spk_status(&spk.id, SpkStatus::InProgress)
            .await
            .unwrap();
        engine
            .release
            .update_spk_status(&spk.id, SpkStatus::Done)
            .await
            .unwrap();
    }
    let mo = engine.release.complete(&mo.id, Role::Spv).await.unwrap();
    assert_eq!(mo.status, MoStatus::Completed);
}

#[tokio::test]
async fn cancelled_spks_count_as_closed() {
    let engine = TestEngine::new().await;
    let (mo, spks) = engine.released_mo(250).await;

    for (index, spk) in spks.iter().enumerate() {
        if index == 0 {
            engine
                .release
                .update_spk_status(&spk.id, SpkStatus::Cancelled)
                .await
                .unwrap();
        } else {
            engine
                .release
                .update_spk_status(&spk.id, SpkStatus::InProgress)
                .await
                .unwrap();
            engine
                .release
                .update_spk_status(&spk.id, SpkStatus::Done)
                .await
                .unwrap();
        }
    }
    let mo = engine.release.complete(&mo.id, Role::Spv).await.unwrap();
    assert_eq!(mo.status, MoStatus::Completed);
}

#[tokio::test]
async fn spk_state_machine_rejects_backward_moves() {
    let engine = TestEngine::new().await;
    let mo = engine.partial_mo(100, dec!(0)).await;
    let spks = engine.release.get_mo_spks(&mo.id).await.unwrap();
    let spk = &spks[0];

    engine
        .release
        .update_spk_status(&spk.id, SpkStatus::InProgress)
        .await
        .unwrap();
    engine
        .release
        .update_spk_status(&spk.id, SpkStatus::Done)
        .await
        .unwrap();

    let err = engine
        .release
        .update_spk_status(&spk.id, SpkStatus::InProgress)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidState(_));

    // Writing the current status again is a no-op, not an error.
    let spk = engine
        .release
        .update_spk_status(&spk.id, SpkStatus::Done)
        .await
        .unwrap();
    assert_eq!(spk.status, SpkStatus::Done);
}

#[tokio::test]
async fn release_pipeline_emits_lifecycle_events() {
    let mut engine = TestEngine::new().await;
    let (mo, _) = engine.released_mo(200).await;

    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ManufacturingOrderCreated(id) if *id == mo.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PoKainBound { mo_id, .. } if *mo_id == mo.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ManufacturingOrderPartiallyReleased(id) if *id == mo.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ManufacturingOrderReleased(id) if *id == mo.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::MaterialAllocationRequested { mo_id, .. } if *mo_id == mo.id)));

    let spks_generated = events
        .iter()
        .filter(|e| matches!(e, Event::SpkGenerated { mo_id, .. } if *mo_id == mo.id))
        .count();
    assert_eq!(spks_generated, 5);
}

#[tokio::test]
async fn list_mos_filters_by_status() {
    let engine = TestEngine::new().await;
    engine.draft_mo(100, dec!(0)).await;
    engine.partial_mo(200, dec!(0)).await;
    engine.partial_mo(300, dec!(0)).await;

    let (all, total) = engine.release.list_mos(None, 1, 10).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(all.len(), 3);

    let (partial, total) = engine
        .release
        .list_mos(Some(MoStatus::Partial), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(partial.iter().all(|mo| mo.status == MoStatus::Partial));

    let (drafts, total) = engine
        .release
        .list_mos(Some(MoStatus::Draft), 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(drafts[0].status, MoStatus::Draft);
}
