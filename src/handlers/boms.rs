use super::common::{
    created_response, no_content_response, paginated_response, success_response, validate_input,
    PaginationParams,
};
use crate::{
    entities::{
        bom::{self, BomType},
        bom_detail::{self, VariantSelectionMode},
        bom_variant::{self, VariantApproval, VariantType},
        Department,
    },
    errors::ServiceError,
    handlers::AppState,
    services::bom_resolver::{
        selection_probabilities, BomView, CreateBomDetailInput, CreateBomInput,
        CreateVariantInput, ExplosionOptions, ExplosionReport, UpdateVariantInput,
        DEFAULT_MAX_DEPTH,
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct BomDetailRequest {
    pub component_id: Uuid,
    pub qty_needed: Decimal,
    /// Percent added on top of the base quantity, defaults to zero.
    pub wastage_percent: Option<Decimal>,
    pub department: Option<Department>,
    pub variant_selection_mode: Option<VariantSelectionMode>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateBomRequest {
    pub product_id: Uuid,
    pub bom_type: Option<BomType>,
    pub qty_output: Decimal,
    pub revision: Option<String>,
    pub supports_multi_material: Option<bool>,
    pub created_by: Option<Uuid>,
    #[validate]
    pub details: Vec<BomDetailRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateVariantRequest {
    pub material_id: Uuid,
    pub variant_type: Option<VariantType>,
    pub sequence: Option<i32>,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    #[validate(range(min = 1))]
    pub weight: i32,
    pub cost_variance: Option<Decimal>,
    pub is_active: Option<bool>,
    pub approval_status: Option<VariantApproval>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateVariantRequest {
    pub variant_type: Option<VariantType>,
    pub sequence: Option<i32>,
    pub qty_variance: Option<Decimal>,
    pub qty_variance_percent: Option<Decimal>,
    pub weight: Option<i32>,
    pub cost_variance: Option<Decimal>,
    pub is_active: Option<bool>,
    pub approval_status: Option<VariantApproval>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MultiMaterialRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BomFilter {
    pub product_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExplosionQuery {
    pub qty: Decimal,
    pub max_depth: Option<u32>,
    pub seed: Option<u64>,
    pub strict: Option<bool>,
}

/// A variant line together with its share of the weighted draw.
/// Ineligible variants carry no probability.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantWithProbability {
    pub variant: bom_variant::Model,
    pub selection_probability: Option<Decimal>,
}

fn detail_input_from(request: BomDetailRequest) -> CreateBomDetailInput {
    CreateBomDetailInput {
        component_id: request.component_id,
        qty_needed: request.qty_needed,
        wastage_percent: request.wastage_percent.unwrap_or_default(),
        department: request.department,
        variant_selection_mode: request
            .variant_selection_mode
            .unwrap_or(VariantSelectionMode::Weighted),
    }
}

/// Create a BOM revision with its component lines
#[utoipa::path(
    post,
    path = "/api/v1/boms",
    request_body = CreateBomRequest,
    responses(
        (status = 201, description = "BOM created", body = crate::ApiResponse<BomView>),
        (status = 400, description = "Invalid line", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn create_bom(
    State(state): State<AppState>,
    Json(payload): Json<CreateBomRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let view = state
        .services
        .bom_resolver
        .create_bom(CreateBomInput {
            product_id: payload.product_id,
            bom_type: payload.bom_type.unwrap_or(BomType::Manufacturing),
            qty_output: payload.qty_output,
            revision: payload.revision,
            supports_multi_material: payload.supports_multi_material.unwrap_or(false),
            created_by: payload.created_by,
            details: payload.details.into_iter().map(detail_input_from).collect(),
        })
        .await?;

    Ok(created_response(view))
}

/// List BOM headers
#[utoipa::path(
    get,
    path = "/api/v1/boms",
    params(BomFilter, PaginationParams),
    responses(
        (status = 200, description = "BOMs listed", body = crate::PaginatedResponse<bom::Model>)
    ),
    tag = "boms"
)]
pub async fn list_boms(
    State(state): State<AppState>,
    Query(filter): Query<BomFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .bom_resolver
        .list_boms(filter.product_id, pagination.page, pagination.per_page)
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

/// Get a BOM with its lines and variants
#[utoipa::path(
    get,
    path = "/api/v1/boms/{id}",
    params(("id" = Uuid, Path, description = "BOM id")),
    responses(
        (status = 200, description = "BOM fetched", body = crate::ApiResponse<BomView>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn get_bom(
    State(state): State<AppState>,
    Path(bom_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .bom_resolver
        .get_bom(&bom_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;

    Ok(success_response(view))
}

/// Append a component line to a BOM
#[utoipa::path(
    post,
    path = "/api/v1/boms/{id}/details",
    params(("id" = Uuid, Path, description = "BOM id")),
    request_body = BomDetailRequest,
    responses(
        (status = 201, description = "Line added", body = crate::ApiResponse<bom_detail::Model>),
        (status = 400, description = "Invalid line", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn add_detail(
    State(state): State<AppState>,
    Path(bom_id): Path<Uuid>,
    Json(payload): Json<BomDetailRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let detail = state
        .services
        .bom_resolver
        .add_detail(&bom_id, detail_input_from(payload))
        .await?;

    Ok(created_response(detail))
}

/// Explode the active BOM of a product
///
/// Walks the multi-level structure, resolving variants along the way,
/// and returns the per-node tree plus the rolled-up requirements.
#[utoipa::path(
    get,
    path = "/api/v1/boms/{id}/explosion",
    params(
        ("id" = Uuid, Path, description = "Product id"),
        ExplosionQuery
    ),
    responses(
        (status = 200, description = "Explosion computed", body = crate::ApiResponse<ExplosionReport>),
        (status = 404, description = "No active BOM", body = crate::errors::ErrorResponse),
        (status = 409, description = "Cycle detected", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn explode_bom(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<ExplosionQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .bom_resolver
        .explode(
            &product_id,
            query.qty,
            ExplosionOptions {
                max_depth: query.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
                seed: query.seed,
                strict: query.strict.unwrap_or(false),
            },
        )
        .await?;

    Ok(success_response(report))
}

/// Add an approved-or-pending variant to a line
#[utoipa::path(
    post,
    path = "/api/v1/bom-details/{id}/variants",
    params(("id" = Uuid, Path, description = "BOM detail id")),
    request_body = CreateVariantRequest,
    responses(
        (status = 201, description = "Variant added", body = crate::ApiResponse<bom_variant::Model>),
        (status = 400, description = "Invalid variance pair", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn add_variant(
    State(state): State<AppState>,
    Path(detail_id): Path<Uuid>,
    Json(payload): Json<CreateVariantRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let variant = state
        .services
        .bom_resolver
        .add_variant(
            &detail_id,
            CreateVariantInput {
                material_id: payload.material_id,
                variant_type: payload.variant_type.unwrap_or(VariantType::Alternative),
                sequence: payload.sequence,
                qty_variance: payload.qty_variance,
                qty_variance_percent: payload.qty_variance_percent,
                weight: payload.weight,
                cost_variance: payload.cost_variance,
                is_active: payload.is_active.unwrap_or(true),
                approval_status: payload.approval_status,
            },
        )
        .await?;

    Ok(created_response(variant))
}

/// List the variants of a line with their draw probabilities
#[utoipa::path(
    get,
    path = "/api/v1/bom-details/{id}/variants",
    params(("id" = Uuid, Path, description = "BOM detail id")),
    responses(
        (status = 200, description = "Variants listed", body = crate::ApiResponse<Vec<VariantWithProbability>>),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn list_variants(
    State(state): State<AppState>,
    Path(detail_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let variants = state.services.bom_resolver.get_variants(&detail_id).await?;
    let probabilities = selection_probabilities(&variants);

    let rows: Vec<VariantWithProbability> = variants
        .into_iter()
        .map(|variant| {
            let selection_probability = probabilities
                .iter()
                .find(|(id, _)| *id == variant.id)
                .map(|(_, share)| *share);
            VariantWithProbability {
                variant,
                selection_probability,
            }
        })
        .collect();

    Ok(success_response(rows))
}

/// Turn multi-material resolution on or off for a line
#[utoipa::path(
    patch,
    path = "/api/v1/bom-details/{id}/multi-material",
    params(("id" = Uuid, Path, description = "BOM detail id")),
    request_body = MultiMaterialRequest,
    responses(
        (status = 200, description = "Toggle applied", body = crate::ApiResponse<bom_detail::Model>),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn toggle_multi_material(
    State(state): State<AppState>,
    Path(detail_id): Path<Uuid>,
    Json(payload): Json<MultiMaterialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .bom_resolver
        .toggle_multi_material(&detail_id, payload.enabled)
        .await?;

    Ok(success_response(detail))
}

/// Update a variant line
#[utoipa::path(
    patch,
    path = "/api/v1/bom-variants/{id}",
    params(("id" = Uuid, Path, description = "BOM variant id")),
    request_body = UpdateVariantRequest,
    responses(
        (status = 200, description = "Variant updated", body = crate::ApiResponse<bom_variant::Model>),
        (status = 400, description = "Invalid variance pair", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn update_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    Json(payload): Json<UpdateVariantRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state
        .services
        .bom_resolver
        .update_variant(
            &variant_id,
            UpdateVariantInput {
                variant_type: payload.variant_type,
                sequence: payload.sequence,
                qty_variance: payload.qty_variance,
                qty_variance_percent: payload.qty_variance_percent,
                weight: payload.weight,
                cost_variance: payload.cost_variance,
                is_active: payload.is_active,
                approval_status: payload.approval_status,
            },
        )
        .await?;

    Ok(success_response(variant))
}

/// Remove a variant line
#[utoipa::path(
    delete,
    path = "/api/v1/bom-variants/{id}",
    params(("id" = Uuid, Path, description = "BOM variant id")),
    responses(
        (status = 204, description = "Variant removed"),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse)
    ),
    tag = "boms"
)]
pub async fn remove_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.bom_resolver.remove_variant(&variant_id).await?;
    Ok(no_content_response())
}

pub fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_bom).get(list_boms))
        .route("/:id", get(get_bom))
        .route("/:id/details", post(add_detail))
        .route("/:id/explosion", get(explode_bom))
}

pub fn bom_detail_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/variants", post(add_variant).get(list_variants))
        .route("/:id/multi-material", patch(toggle_multi_material))
}

pub fn bom_variant_routes() -> Router<AppState> {
    Router::new().route("/:id", patch(update_variant).delete(remove_variant))
}
