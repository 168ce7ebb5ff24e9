use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PPIC API",
        version = "1.0.0",
        description = r#"
# Production Planning API for Garment Manufacturing

Order-release backend covering the path from a customer purchase order to
per-department work orders and resolved material requirements.

## Features

- **Purchase Orders**: Register and receive the fabric (KAIN) and label POs that gate a release
- **Manufacturing Orders**: Dual-trigger release lifecycle with buffer sizing and SPK fan-out
- **BOM Explosion**: Multi-level explosion with wastage compounding and weighted variant resolution
- **Material Ledger**: Allocations, stock balances, and the debt approval/settlement track
- **WIP Buffers**: Per-department buffer tracking, transfers, and bottleneck detection

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "error": "Conflict",
  "message": "MO must be in PARTIAL to fully release",
  "timestamp": "2025-01-01T00:00:00Z"
}
```

## Pagination

List endpoints support pagination with the following query parameters:
- `page`: Page number (default: 1)
- `per_page`: Items per page (default: 20)
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "purchase-orders", description = "Customer PO registry"),
        (name = "manufacturing-orders", description = "MO release lifecycle and SPK fan-out"),
        (name = "boms", description = "BOM structure, variants and explosion"),
        (name = "wip", description = "Work-in-progress buffer tracking"),
        (name = "material-debts", description = "Material debt approval and settlement"),
        (name = "materials", description = "Stock receipts and balances")
    ),
    paths(
        // Purchase orders
        crate::handlers::purchase_orders::create_po,
        crate::handlers::purchase_orders::list_pos,
        crate::handlers::purchase_orders::get_po,
        crate::handlers::purchase_orders::receive_po,
        crate::handlers::purchase_orders::cancel_po,

        // Manufacturing orders
        crate::handlers::manufacturing_orders::create_mo,
        crate::handlers::manufacturing_orders::list_mos,
        crate::handlers::manufacturing_orders::get_mo,
        crate::handlers::manufacturing_orders::get_mo_spks,
        crate::handlers::manufacturing_orders::get_mo_allocations,
        crate::handlers::manufacturing_orders::bind_kain,
        crate::handlers::manufacturing_orders::apply_buffer,
        crate::handlers::manufacturing_orders::release_partial,
        crate::handlers::manufacturing_orders::release_full,
        crate::handlers::manufacturing_orders::redrive_fanout,
        crate::handlers::manufacturing_orders::complete_mo,
        crate::handlers::manufacturing_orders::update_spk_status,

        // BOMs
        crate::handlers::boms::create_bom,
        crate::handlers::boms::list_boms,
        crate::handlers::boms::get_bom,
        crate::handlers::boms::add_detail,
        crate::handlers::boms::explode_bom,
        crate::handlers::boms::add_variant,
        crate::handlers::boms::list_variants,
        crate::handlers::boms::toggle_multi_material,
        crate::handlers::boms::update_variant,
        crate::handlers::boms::remove_variant,

        // WIP
        crate::handlers::wip::list_wip,
        crate::handlers::wip::detect_bottleneck,
        crate::handlers::wip::get_snapshot,
        crate::handlers::wip::record_production,
        crate::handlers::wip::record_consumption,
        crate::handlers::wip::transfer,

        // Material debts
        crate::handlers::material_debts::create_debt,
        crate::handlers::material_debts::list_debts,
        crate::handlers::material_debts::get_debt,
        crate::handlers::material_debts::approve_debt,
        crate::handlers::material_debts::adjust_debt,

        // Materials
        crate::handlers::materials::receive_material,
        crate::handlers::materials::list_balances,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::errors::ErrorResponse,
            crate::auth::Role,
            crate::entities::Department,

            // Purchase orders
            crate::entities::purchase_order::Model,
            crate::entities::purchase_order::PoKind,
            crate::entities::purchase_order::PoStatus,
            crate::handlers::purchase_orders::CreatePoRequest,

            // Manufacturing orders
            crate::entities::manufacturing_order::Model,
            crate::entities::manufacturing_order::MoStatus,
            crate::entities::spk::Model,
            crate::entities::spk::SpkStatus,
            crate::handlers::manufacturing_orders::CreateMoRequest,
            crate::handlers::manufacturing_orders::ActorRequest,
            crate::handlers::manufacturing_orders::BindKainRequest,
            crate::handlers::manufacturing_orders::BufferRequest,
            crate::handlers::manufacturing_orders::SpkStatusRequest,

            // BOMs
            crate::entities::bom::Model,
            crate::entities::bom::BomType,
            crate::entities::bom_detail::Model,
            crate::entities::bom_detail::VariantSelectionMode,
            crate::entities::bom_variant::Model,
            crate::entities::bom_variant::VariantType,
            crate::entities::bom_variant::VariantApproval,
            crate::services::bom_resolver::BomView,
            crate::services::bom_resolver::BomDetailView,
            crate::services::bom_resolver::ExplosionNode,
            crate::services::bom_resolver::ExplosionReport,
            crate::services::bom_resolver::MaterialRequirement,
            crate::handlers::boms::CreateBomRequest,
            crate::handlers::boms::BomDetailRequest,
            crate::handlers::boms::CreateVariantRequest,
            crate::handlers::boms::UpdateVariantRequest,
            crate::handlers::boms::MultiMaterialRequest,
            crate::handlers::boms::VariantWithProbability,

            // WIP
            crate::entities::wip_buffer::WipStatus,
            crate::services::wip_tracker::WipSnapshot,
            crate::services::wip_tracker::DepartmentThroughput,
            crate::services::wip_tracker::BottleneckReport,
            crate::handlers::wip::ProductionRequest,
            crate::handlers::wip::ConsumptionRequest,
            crate::handlers::wip::TransferRequest,
            crate::handlers::wip::TransferResult,

            // Material ledger
            crate::entities::material_allocation::Model,
            crate::entities::material_allocation::AllocationStatus,
            crate::entities::material_balance::Model,
            crate::entities::material_debt::Model,
            crate::entities::material_debt::DebtApprovalStatus,
            crate::entities::material_debt::DebtStatus,
            crate::entities::debt_settlement::Model,
            crate::services::material_ledger::ApprovalDecision,
            crate::services::material_ledger::DebtDetail,
            crate::handlers::material_debts::CreateDebtRequest,
            crate::handlers::material_debts::ApproveDebtRequest,
            crate::handlers::material_debts::AdjustDebtRequest,
            crate::handlers::materials::ReceiveMaterialRequest,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
