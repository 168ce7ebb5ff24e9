use super::common::{
    created_response, paginated_response, success_response, validate_input, PaginationParams,
};
use crate::{
    auth::Role,
    entities::{
        manufacturing_order::{self, MoStatus},
        material_allocation,
        spk::{self, SpkStatus},
    },
    errors::ServiceError,
    handlers::AppState,
    services::release::CreateMoInput,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Creation payload. The target quantity is not here on purpose: it
/// comes from the label PO being bound.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateMoRequest {
    pub article_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub article_code: String,
    pub po_label_id: Uuid,
    /// Percent in [0, 10].
    pub buffer_percent: Option<Decimal>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActorRequest {
    pub actor_role: Role,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BindKainRequest {
    pub po_kain_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BufferRequest {
    pub buffer_percent: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SpkStatusRequest {
    pub status: SpkStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MoFilter {
    pub status: Option<MoStatus>,
}

/// Create an MO from a received label PO
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders",
    request_body = CreateMoRequest,
    responses(
        (status = 201, description = "Manufacturing order created", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 409, description = "Label already bound", body = crate::errors::ErrorResponse),
        (status = 422, description = "Label not received yet", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn create_mo(
    State(state): State<AppState>,
    Json(payload): Json<CreateMoRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let mo = state
        .services
        .release
        .create_mo(CreateMoInput {
            article_id: payload.article_id,
            article_code: payload.article_code,
            po_label_id: payload.po_label_id,
            buffer_percent: payload.buffer_percent,
            created_by: payload.created_by,
        })
        .await?;

    Ok(created_response(mo))
}

/// List manufacturing orders
#[utoipa::path(
    get,
    path = "/api/v1/manufacturing-orders",
    params(MoFilter, PaginationParams),
    responses(
        (status = 200, description = "Manufacturing orders listed", body = crate::PaginatedResponse<manufacturing_order::Model>)
    ),
    tag = "manufacturing-orders"
)]
pub async fn list_mos(
    State(state): State<AppState>,
    Query(filter): Query<MoFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .release
        .list_mos(filter.status, pagination.page, pagination.per_page)
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

/// Get a manufacturing order
#[utoipa::path(
    get,
    path = "/api/v1/manufacturing-orders/{id}",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    responses(
        (status = 200, description = "Manufacturing order fetched", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn get_mo(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .get_mo(&mo_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("manufacturing order {} not found", mo_id))
        })?;

    Ok(success_response(mo))
}

/// List the SPKs fanned out for an MO
#[utoipa::path(
    get,
    path = "/api/v1/manufacturing-orders/{id}/spks",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    responses(
        (status = 200, description = "SPKs listed", body = crate::ApiResponse<Vec<spk::Model>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn get_mo_spks(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let spks = state.services.release.get_mo_spks(&mo_id).await?;
    Ok(success_response(spks))
}

/// List the material allocations requested for an MO
#[utoipa::path(
    get,
    path = "/api/v1/manufacturing-orders/{id}/allocations",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    responses(
        (status = 200, description = "Allocations listed", body = crate::ApiResponse<Vec<material_allocation::Model>>)
    ),
    tag = "manufacturing-orders"
)]
pub async fn get_mo_allocations(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let allocations = state.services.material_ledger.get_allocations(&mo_id).await?;
    Ok(success_response(allocations))
}

/// Bind a fabric PO to an MO
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/bind-kain",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = BindKainRequest,
    responses(
        (status = 200, description = "Fabric PO bound", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 409, description = "Already bound or consumed", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn bind_kain(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<BindKainRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .bind_po_kain(&mo_id, &payload.po_kain_id)
        .await?;
    Ok(success_response(mo))
}

/// Change the buffer percent of an unreleased MO
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/buffer",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = BufferRequest,
    responses(
        (status = 200, description = "Buffer applied", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 400, description = "Buffer percent out of range", body = crate::errors::ErrorResponse),
        (status = 409, description = "MO already fully released", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn apply_buffer(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<BufferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .apply_buffer(&mo_id, payload.buffer_percent)
        .await?;
    Ok(success_response(mo))
}

/// Partial release: unlock Cutting and Embroidery
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/release-partial",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "MO partially released", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 403, description = "Role cannot release", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not in DRAFT", body = crate::errors::ErrorResponse),
        (status = 422, description = "Fabric PO missing or not received", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn release_partial(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .release_partial(&mo_id, payload.actor_role)
        .await?;
    Ok(success_response(mo))
}

/// Full release: unlock the remaining departments and request materials
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/release-full",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "MO fully released", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 403, description = "Role cannot release", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not in PARTIAL", body = crate::errors::ErrorResponse),
        (status = 422, description = "Label not received or explosion failed", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn release_full(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .release_full(&mo_id, payload.actor_role)
        .await?;
    Ok(success_response(mo))
}

/// Re-run outstanding fan-out legs
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/redrive-fanout",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Fan-out redriven", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 409, description = "Nothing to redrive", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn redrive_fanout(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .redrive_fanout(&mo_id, payload.actor_role)
        .await?;
    Ok(success_response(mo))
}

/// Complete a fully released MO
#[utoipa::path(
    post,
    path = "/api/v1/manufacturing-orders/{id}/complete",
    params(("id" = Uuid, Path, description = "Manufacturing order id")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "MO completed", body = crate::ApiResponse<manufacturing_order::Model>),
        (status = 409, description = "Not in RELEASED", body = crate::errors::ErrorResponse),
        (status = 422, description = "Open SPKs remain", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn complete_mo(
    State(state): State<AppState>,
    Path(mo_id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let mo = state
        .services
        .release
        .complete(&mo_id, payload.actor_role)
        .await?;
    Ok(success_response(mo))
}

/// Move an SPK through its shop-floor lifecycle
#[utoipa::path(
    post,
    path = "/api/v1/spks/{id}/status",
    params(("id" = Uuid, Path, description = "SPK id")),
    request_body = SpkStatusRequest,
    responses(
        (status = 200, description = "SPK status changed", body = crate::ApiResponse<spk::Model>),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    tag = "manufacturing-orders"
)]
pub async fn update_spk_status(
    State(state): State<AppState>,
    Path(spk_id): Path<Uuid>,
    Json(payload): Json<SpkStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let spk = state
        .services
        .release
        .update_spk_status(&spk_id, payload.status)
        .await?;
    Ok(success_response(spk))
}

pub fn mo_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_mo).get(list_mos))
        .route("/:id", get(get_mo))
        .route("/:id/spks", get(get_mo_spks))
        .route("/:id/allocations", get(get_mo_allocations))
        .route("/:id/bind-kain", post(bind_kain))
        .route("/:id/buffer", post(apply_buffer))
        .route("/:id/release-partial", post(release_partial))
        .route("/:id/release-full", post(release_full))
        .route("/:id/redrive-fanout", post(redrive_fanout))
        .route("/:id/complete", post(complete_mo))
}

pub fn spk_routes() -> Router<AppState> {
    Router::new().route("/:id/status", post(update_spk_status))
}
