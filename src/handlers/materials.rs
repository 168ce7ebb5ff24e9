use super::common::{paginated_response, success_response, validate_input, PaginationParams};
use crate::{
    entities::material_balance,
    errors::ServiceError,
    handlers::AppState,
    services::material_ledger::DEFAULT_LOCATION,
};
use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveMaterialRequest {
    pub material_id: Uuid,
    /// Defaults to the central warehouse.
    pub location: Option<String>,
    pub qty: Decimal,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceFilter {
    pub material_id: Option<Uuid>,
    pub location: Option<String>,
}

/// Post a goods receipt into a stock location
#[utoipa::path(
    post,
    path = "/api/v1/materials/receive",
    request_body = ReceiveMaterialRequest,
    responses(
        (status = 200, description = "Receipt posted", body = crate::ApiResponse<material_balance::Model>),
        (status = 400, description = "Quantity not positive", body = crate::errors::ErrorResponse)
    ),
    tag = "materials"
)]
pub async fn receive_material(
    State(state): State<AppState>,
    Json(payload): Json<ReceiveMaterialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let location = payload
        .location
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let balance = state
        .services
        .material_ledger
        .receive_material(&payload.material_id, &location, payload.qty)
        .await?;

    Ok(success_response(balance))
}

/// List stock balances
#[utoipa::path(
    get,
    path = "/api/v1/materials/balances",
    params(BalanceFilter, PaginationParams),
    responses(
        (status = 200, description = "Balances listed", body = crate::PaginatedResponse<material_balance::Model>)
    ),
    tag = "materials"
)]
pub async fn list_balances(
    State(state): State<AppState>,
    Query(filter): Query<BalanceFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .material_ledger
        .get_balances(
            filter.material_id,
            filter.location,
            pagination.page,
            pagination.per_page,
        )
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

pub fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/receive", post(receive_material))
        .route("/balances", get(list_balances))
}
