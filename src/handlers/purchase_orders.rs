use super::common::{
    created_response, paginated_response, success_response, validate_input, PaginationParams,
};
use crate::{
    entities::purchase_order::{self, PoKind, PoStatus},
    errors::ServiceError,
    handlers::AppState,
    services::po_registry::CreatePoInput,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Registration payload for a KAIN (fabric) or LABEL purchase order.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePoRequest {
    #[validate(length(min = 1, max = 64))]
    pub po_number: String,
    pub kind: PoKind,
    #[validate(range(min = 1))]
    pub qty: i32,
    pub week: Option<String>,
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PoFilter {
    pub kind: Option<PoKind>,
    pub status: Option<PoStatus>,
}

/// Register a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePoRequest,
    responses(
        (status = 201, description = "Purchase order registered", body = crate::ApiResponse<purchase_order::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn create_po(
    State(state): State<AppState>,
    Json(payload): Json<CreatePoRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let po = state
        .services
        .po_registry
        .create_po(CreatePoInput {
            po_number: payload.po_number,
            kind: payload.kind,
            qty: payload.qty,
            week: payload.week,
            destination: payload.destination,
        })
        .await?;

    Ok(created_response(po))
}

/// List purchase orders
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(PoFilter, PaginationParams),
    responses(
        (status = 200, description = "Purchase orders listed", body = crate::PaginatedResponse<purchase_order::Model>)
    ),
    tag = "purchase-orders"
)]
pub async fn list_pos(
    State(state): State<AppState>,
    Query(filter): Query<PoFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .po_registry
        .list_pos(
            filter.kind,
            filter.status,
            pagination.page,
            pagination.per_page,
        )
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

/// Get a purchase order
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order fetched", body = crate::ApiResponse<purchase_order::Model>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_po(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let po = state
        .services
        .po_registry
        .get_po(&po_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", po_id)))?;

    Ok(success_response(po))
}

/// Mark a purchase order received
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order received", body = crate::ApiResponse<purchase_order::Model>),
        (status = 409, description = "Not receivable in its current status", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn receive_po(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let po = state.services.po_registry.receive_po(&po_id).await?;
    Ok(success_response(po))
}

/// Cancel a purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order id")),
    responses(
        (status = 200, description = "Purchase order cancelled", body = crate::ApiResponse<purchase_order::Model>),
        (status = 409, description = "Not cancellable in its current status", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_po(
    State(state): State<AppState>,
    Path(po_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let po = state.services.po_registry.cancel_po(&po_id).await?;
    Ok(success_response(po))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_po).get(list_pos))
        .route("/:id", get(get_po))
        .route("/:id/receive", post(receive_po))
        .route("/:id/cancel", post(cancel_po))
}
