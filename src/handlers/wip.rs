use super::common::{paginated_response, success_response, validate_input, PaginationParams};
use crate::{
    entities::Department,
    errors::ServiceError,
    handlers::AppState,
    services::wip_tracker::{BottleneckReport, WipSnapshot},
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

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductionRequest {
    pub spk_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConsumptionRequest {
    pub spk_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    pub from_spk_id: Uuid,
    pub to_spk_id: Uuid,
    #[validate(range(min = 1))]
    pub qty: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferResult {
    pub from: WipSnapshot,
    pub to: WipSnapshot,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WipFilter {
    pub article_code: Option<String>,
    pub department: Option<Department>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BottleneckQuery {
    pub article_code: String,
}

/// List WIP buffers
#[utoipa::path(
    get,
    path = "/api/v1/wip",
    params(WipFilter, PaginationParams),
    responses(
        (status = 200, description = "WIP buffers listed", body = crate::PaginatedResponse<WipSnapshot>)
    ),
    tag = "wip"
)]
pub async fn list_wip(
    State(state): State<AppState>,
    Query(filter): Query<WipFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .wip_tracker
        .list_wip(
            filter.article_code,
            filter.department,
            pagination.page,
            pagination.per_page,
        )
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

/// Find the production bottleneck for an article
#[utoipa::path(
    get,
    path = "/api/v1/wip/bottleneck",
    params(BottleneckQuery),
    responses(
        (status = 200, description = "Bottleneck report", body = crate::ApiResponse<BottleneckReport>),
        (status = 404, description = "No WIP entries for the article", body = crate::errors::ErrorResponse)
    ),
    tag = "wip"
)]
pub async fn detect_bottleneck(
    State(state): State<AppState>,
    Query(query): Query<BottleneckQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .wip_tracker
        .detect_bottleneck(&query.article_code)
        .await?;

    Ok(success_response(report))
}

/// Get the WIP buffer of an SPK
#[utoipa::path(
    get,
    path = "/api/v1/wip/{spk_id}",
    params(("spk_id" = Uuid, Path, description = "SPK id")),
    responses(
        (status = 200, description = "WIP buffer fetched", body = crate::ApiResponse<WipSnapshot>),
        (status = 404, description = "No buffer for the SPK", body = crate::errors::ErrorResponse)
    ),
    tag = "wip"
)]
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(spk_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let snapshot = state
        .services
        .wip_tracker
        .get_snapshot(&spk_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no WIP buffer for SPK {}", spk_id)))?;

    Ok(success_response(snapshot))
}

/// Record finished units coming out of a department
#[utoipa::path(
    post,
    path = "/api/v1/wip/production",
    request_body = ProductionRequest,
    responses(
        (status = 200, description = "Production recorded", body = crate::ApiResponse<WipSnapshot>),
        (status = 409, description = "SPK not in progress", body = crate::errors::ErrorResponse)
    ),
    tag = "wip"
)]
pub async fn record_production(
    State(state): State<AppState>,
    Json(payload): Json<ProductionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let snapshot = state
        .services
        .wip_tracker
        .record_production(&payload.spk_id, payload.qty)
        .await?;

    Ok(success_response(snapshot))
}

/// Record units pulled into a department from the upstream buffer
#[utoipa::path(
    post,
    path = "/api/v1/wip/consumption",
    request_body = ConsumptionRequest,
    responses(
        (status = 200, description = "Consumption recorded", body = crate::ApiResponse<WipSnapshot>),
        (status = 409, description = "SPK not in progress", body = crate::errors::ErrorResponse)
    ),
    tag = "wip"
)]
pub async fn record_consumption(
    State(state): State<AppState>,
    Json(payload): Json<ConsumptionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let snapshot = state
        .services
        .wip_tracker
        .record_consumption(&payload.spk_id, payload.qty)
        .await?;

    Ok(success_response(snapshot))
}

/// Move buffered units between two SPKs of the same article
#[utoipa::path(
    post,
    path = "/api/v1/wip/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer applied", body = crate::ApiResponse<TransferResult>),
        (status = 422, description = "Transfer would exceed the debt allowance", body = crate::errors::ErrorResponse)
    ),
    tag = "wip"
)]
pub async fn transfer(
    State(state): State<AppState>,
    Json(payload): Json<TransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let (from, to) = state
        .services
        .wip_tracker
        .transfer(&payload.from_spk_id, &payload.to_spk_id, payload.qty)
        .await?;

    Ok(success_response(TransferResult { from, to }))
}

pub fn wip_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_wip))
        .route("/bottleneck", get(detect_bottleneck))
        .route("/production", post(record_production))
        .route("/consumption", post(record_consumption))
        .route("/transfer", post(transfer))
        .route("/:spk_id", get(get_snapshot))
}
