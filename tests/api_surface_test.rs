mod common;

use axum::http::Method;
use common::{response_json, TestApp};
use ppic_api::{
    auth::Role,
    entities::{manufacturing_order, purchase_order::PoKind, spk},
    services::{po_registry::CreatePoInput, release::CreateMoInput},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

fn as_decimal(value: &serde_json::Value) -> Decimal {
    value
        .as_str()
        .expect("decimal field serialized as string")
        .parse()
        .expect("decimal parse")
}

/// Drives PO registration, MO creation, binding and partial release
/// through the service layer so HTTP tests can start from a fanned-out
/// order.
async fn partial_mo_via_services(
    app: &TestApp,
) -> (manufacturing_order::Model, Vec<spk::Model>) {
    let services = &app.state.services;

    let label = services
        .po_registry
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Label,
            qty: 400,
            week: Some("W35".to_string()),
            destination: Some("BANDUNG".to_string()),
        })
        .await
        .unwrap();
    services.po_registry.receive_po(&label.id).await.unwrap();

    let kain = services
        .po_registry
        .create_po(CreatePoInput {
            po_number: common::po_number(),
            kind: PoKind::Kain,
            qty: 400,
            week: None,
            destination: None,
        })
        .await
        .unwrap();
    services.po_registry.receive_po(&kain.id).await.unwrap();

    let mo = services
        .release
        .create_mo(CreateMoInput {
            article_id: Uuid::new_v4(),
            article_code: common::article_code(),
            po_label_id: label.id,
            buffer_percent: None,
            created_by: None,
        })
        .await
        .unwrap();
    services.release.bind_po_kain(&mo.id, &kain.id).await.unwrap();
    let mo = services
        .release
        .release_partial(&mo.id, Role::Spv)
        .await
        .unwrap();
    let spks = services.release.get_mo_spks(&mo.id).await.unwrap();

    (mo, spks)
}

#[tokio::test]
async fn status_and_health_endpoints_respond() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/status", None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "ppic-api");

    let response = app.request(Method::GET, "/api/v1/health", None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn release_pipeline_over_http() {
    let app = TestApp::new().await;

    // Register and receive the label PO that carries the plan.
    let response = app
        .request(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "po_number": common::po_number(),
                "kind": "LABEL",
                "qty": 400,
                "week": "W35",
                "destination": "BANDUNG"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "ISSUED");
    let label_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-orders/{label_id}/receive"),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    // Fabric PO, received as well.
    let response = app
        .request(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "po_number": common::po_number(),
                "kind": "KAIN",
                "qty": 400
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let kain_id = body["data"]["id"].as_str().unwrap().to_string();
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/purchase-orders/{kain_id}/receive"),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    // MO takes its target from the label and applies the buffer.
    let article_id = Uuid::new_v4();
    let response = app
        .request(
            Method::POST,
            "/api/v1/manufacturing-orders",
            Some(json!({
                "article_id": article_id,
                "article_code": common::article_code(),
                "po_label_id": label_id,
                "buffer_percent": "5"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "DRAFT");
    assert_eq!(body["data"]["target_qty"], 400);
    assert_eq!(body["data"]["final_qty"], 420);
    assert_eq!(body["data"]["week"], "W35");
    let mo_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing-orders/{mo_id}/bind-kain"),
            Some(json!({ "po_kain_id": kain_id })),
        )
        .await;
    assert_eq!(response.status(), 200);

    // An operator cannot pull the release trigger.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing-orders/{mo_id}/release-partial"),
            Some(json!({ "actor_role": "OPERATOR" })),
        )
        .await;
    assert_eq!(response.status(), 403);
    let body = response_json(response).await;
    assert_eq!(body["error"], "UNAUTHORIZED_TRANSITION");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing-orders/{mo_id}/release-partial"),
            Some(json!({ "actor_role": "SPV" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "PARTIAL");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/manufacturing-orders/{mo_id}/spks"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Flat BOM so the full release can explode material requirements.
    let material_id = Uuid::new_v4();
    let response = app
        .request(
            Method::POST,
            "/api/v1/boms",
            Some(json!({
                "product_id": article_id,
                "qty_output": "1",
                "details": [{
                    "component_id": material_id,
                    "qty_needed": "2",
                    "department": "CUTTING",
                    "variant_selection_mode": "PRIMARY_FIRST"
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/manufacturing-orders/{mo_id}/release-full"),
            Some(json!({ "actor_role": "MANAGER" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "RELEASED");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/manufacturing-orders/{mo_id}/spks"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    let first_spk_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/manufacturing-orders/{mo_id}/allocations"),
            None,
        )
        .await;
    let body = response_json(response).await;
    let allocations = body["data"].as_array().unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0]["status"], "COMMITTED");
    assert_eq!(allocations[0]["material_id"], material_id.to_string());
    assert_eq!(as_decimal(&allocations[0]["qty"]), dec!(840));

    // SPK lifecycle over HTTP, including a rejected backward move.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/spks/{first_spk_id}/status"),
            Some(json!({ "status": "IN_PROGRESS" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/spks/{first_spk_id}/status"),
            Some(json!({ "status": "PENDING" })),
        )
        .await;
    assert_eq!(response.status(), 409);
    let body = response_json(response).await;
    assert_eq!(body["error"], "INVALID_STATE");
}

#[tokio::test]
async fn wip_and_debt_flow_over_http() {
    let app = TestApp::new().await;
    let (mo, spks) = partial_mo_via_services(&app).await;
    let cutting = &spks[0];

    let response = app
        .request(
            Method::POST,
            "/api/v1/wip/production",
            Some(json!({ "spk_id": cutting.id, "qty": 50 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["buffer_stock"], 50);
    assert_eq!(body["data"]["status"], "CRITICAL");

    let response = app
        .request(
            Method::POST,
            "/api/v1/wip/consumption",
            Some(json!({ "spk_id": cutting.id, "qty": 80 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["buffer_stock"], -30);
    assert_eq!(body["data"]["status"], "NEGATIVE");

    let response = app
        .request(Method::GET, &format!("/api/v1/wip/{}", cutting.id), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["buffer_stock"], -30);

    let uri = format!(
        "/api/v1/wip?article_code={}&department=CUTTING",
        mo.article_code
    );
    let response = app.request(Method::GET, &uri, None).await;
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);

    let uri = format!("/api/v1/wip/bottleneck?article_code={}", mo.article_code);
    let response = app.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(
        body["data"]["bottleneck"]["spk_id"],
        cutting.id.to_string()
    );

    // Debt lifecycle: create, role-gated approval, settle.
    let material_id = Uuid::new_v4();
    let response = app
        .request(
            Method::POST,
            "/api/v1/material-debts",
            Some(json!({
                "spk_id": cutting.id,
                "material_id": material_id,
                "qty_owed": "60",
                "reason": "Carton shipment arrived short"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["approval_status"], "PENDING_APPROVAL");
    assert_eq!(body["data"]["requires_escalation"], false);
    let debt_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/material-debts/{debt_id}/approve"),
            Some(json!({ "decision": "APPROVE", "approver_role": "OPERATOR" })),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/material-debts/{debt_id}/approve"),
            Some(json!({ "decision": "APPROVE", "approver_role": "SPV" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["approval_status"], "APPROVED");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/material-debts/{debt_id}/adjust"),
            Some(json!({ "actual_received_qty": "60" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["debt"]["debt_status"], "FULLY_RESOLVED");
    assert_eq!(as_decimal(&body["data"]["remaining_debt"]), dec!(0));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/material-debts/{debt_id}"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["settlements"].as_array().unwrap().len(), 1);

    // Goods receipt and the balance listing.
    let response = app
        .request(
            Method::POST,
            "/api/v1/materials/receive",
            Some(json!({ "material_id": material_id, "qty": "25" })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["location"], "WAREHOUSE");
    assert_eq!(as_decimal(&body["data"]["on_hand"]), dec!(25));

    let uri = format!("/api/v1/materials/balances?material_id={material_id}");
    let response = app.request(Method::GET, &uri, None).await;
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn explosion_endpoint_resolves_the_active_bom() {
    let app = TestApp::new().await;
    let product_id = Uuid::new_v4();
    let material_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            "/api/v1/boms",
            Some(json!({
                "product_id": product_id,
                "qty_output": "1",
                "details": [{
                    "component_id": material_id,
                    "qty_needed": "2",
                    "wastage_percent": "3",
                    "department": "CUTTING"
                }]
            })),
        )
        .await;
    assert_eq!(response.status(), 201);

    let uri = format!("/api/v1/boms/{product_id}/explosion?qty=100&seed=7");
    let response = app.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let nodes = body["data"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(as_decimal(&nodes[0]["qty_base"]), dec!(200));
    assert_eq!(as_decimal(&nodes[0]["qty_required"]), dec!(206));
    let rolled = body["data"]["rolled_up"].as_array().unwrap();
    assert_eq!(rolled.len(), 1);
    assert_eq!(as_decimal(&rolled[0]["total_qty"]), dec!(206));

    // Unknown product has no active BOM.
    let uri = format!("/api/v1/boms/{}/explosion?qty=100", Uuid::new_v4());
    let response = app.request(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn error_envelope_is_uniform() {
    let app = TestApp::new().await;

    let missing = Uuid::new_v4();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/manufacturing-orders/{missing}"),
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["error"], "NOT_FOUND");
    assert!(body["message"].as_str().unwrap().contains(&missing.to_string()));
    assert!(body["timestamp"].is_string());

    // Payload validation is rejected before the service layer runs.
    let response = app
        .request(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "po_number": common::po_number(),
                "kind": "KAIN",
                "qty": 0
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn pagination_envelope_over_http() {
    let app = TestApp::new().await;
    for _ in 0..3 {
        app.state
            .services
            .po_registry
            .create_po(CreatePoInput {
                po_number: common::po_number(),
                kind: PoKind::Kain,
                qty: 10,
                week: None,
                destination: None,
            })
            .await
            .unwrap();
    }

    let response = app
        .request(Method::GET, "/api/v1/purchase-orders?page=1&per_page=2", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["total_pages"], 2);

    let response = app
        .request(Method::GET, "/api/v1/purchase-orders?page=2&per_page=2", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}
