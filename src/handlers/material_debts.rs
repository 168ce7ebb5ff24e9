use super::common::{
    created_response, paginated_response, success_response, validate_input, PaginationParams,
};
use crate::{
    auth::Role,
    entities::{
        material_debt::{self, DebtApprovalStatus, DebtStatus},
        Department,
    },
    errors::ServiceError,
    handlers::AppState,
    services::material_ledger::{
        ApprovalDecision, CreateDebtInput, DebtDetail, SettleDebtInput,
    },
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateDebtRequest {
    pub spk_id: Uuid,
    pub material_id: Uuid,
    pub department: Option<Department>,
    pub qty_owed: Decimal,
    pub due_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
    /// When true the SPK may keep producing while approval is pending.
    pub allow_production_while_pending: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApproveDebtRequest {
    pub decision: ApprovalDecision,
    pub approver_role: Role,
    pub notes: Option<String>,
}

/// Records the material that actually arrived against an open debt.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdjustDebtRequest {
    pub actual_received_qty: Decimal,
    pub notes: Option<String>,
    pub received_date: Option<DateTime<Utc>>,
    pub recorded_by: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DebtFilter {
    pub spk_id: Option<Uuid>,
    pub approval_status: Option<DebtApprovalStatus>,
    pub debt_status: Option<DebtStatus>,
}

/// Record a material debt against an SPK
#[utoipa::path(
    post,
    path = "/api/v1/material-debts",
    request_body = CreateDebtRequest,
    responses(
        (status = 201, description = "Debt recorded", body = crate::ApiResponse<material_debt::Model>),
        (status = 404, description = "SPK not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-debts"
)]
pub async fn create_debt(
    State(state): State<AppState>,
    Json(payload): Json<CreateDebtRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let debt = state
        .services
        .material_ledger
        .create_debt(CreateDebtInput {
            spk_id: payload.spk_id,
            material_id: payload.material_id,
            department: payload.department,
            qty_owed: payload.qty_owed,
            due_date: payload.due_date,
            reason: payload.reason,
            allow_production_while_pending: payload
                .allow_production_while_pending
                .unwrap_or(false),
        })
        .await?;

    Ok(created_response(debt))
}

/// List material debts
#[utoipa::path(
    get,
    path = "/api/v1/material-debts",
    params(DebtFilter, PaginationParams),
    responses(
        (status = 200, description = "Debts listed", body = crate::PaginatedResponse<material_debt::Model>)
    ),
    tag = "material-debts"
)]
pub async fn list_debts(
    State(state): State<AppState>,
    Query(filter): Query<DebtFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (items, total) = state
        .services
        .material_ledger
        .list_debts(
            filter.spk_id,
            filter.approval_status,
            filter.debt_status,
            pagination.page,
            pagination.per_page,
        )
        .await?;

    Ok(paginated_response(items, total, &pagination))
}

/// Get a debt with its settlement history
#[utoipa::path(
    get,
    path = "/api/v1/material-debts/{id}",
    params(("id" = Uuid, Path, description = "Debt id")),
    responses(
        (status = 200, description = "Debt fetched", body = crate::ApiResponse<DebtDetail>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "material-debts"
)]
pub async fn get_debt(
    State(state): State<AppState>,
    Path(debt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .material_ledger
        .get_debt(&debt_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("material debt {} not found", debt_id)))?;

    Ok(success_response(detail))
}

/// Decide on a pending debt
#[utoipa::path(
    post,
    path = "/api/v1/material-debts/{id}/approve",
    params(("id" = Uuid, Path, description = "Debt id")),
    request_body = ApproveDebtRequest,
    responses(
        (status = 200, description = "Decision applied", body = crate::ApiResponse<material_debt::Model>),
        (status = 403, description = "Role cannot decide at this tier", body = crate::errors::ErrorResponse),
        (status = 409, description = "Debt already decided", body = crate::errors::ErrorResponse)
    ),
    tag = "material-debts"
)]
pub async fn approve_debt(
    State(state): State<AppState>,
    Path(debt_id): Path<Uuid>,
    Json(payload): Json<ApproveDebtRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let debt = state
        .services
        .material_ledger
        .approve_debt(&debt_id, payload.decision, payload.approver_role, payload.notes)
        .await?;

    Ok(success_response(debt))
}

/// Settle a debt with the received quantity
#[utoipa::path(
    post,
    path = "/api/v1/material-debts/{id}/adjust",
    params(("id" = Uuid, Path, description = "Debt id")),
    request_body = AdjustDebtRequest,
    responses(
        (status = 200, description = "Settlement recorded", body = crate::ApiResponse<DebtDetail>),
        (status = 409, description = "Debt rejected or already resolved", body = crate::errors::ErrorResponse)
    ),
    tag = "material-debts"
)]
pub async fn adjust_debt(
    State(state): State<AppState>,
    Path(debt_id): Path<Uuid>,
    Json(payload): Json<AdjustDebtRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state
        .services
        .material_ledger
        .settle_debt(
            &debt_id,
            SettleDebtInput {
                qty_received: payload.actual_received_qty,
                notes: payload.notes,
                recorded_by: payload.recorded_by,
                settlement_date: payload.received_date,
            },
        )
        .await?;

    Ok(success_response(detail))
}

pub fn debt_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_debt).get(list_debts))
        .route("/:id", get(get_debt))
        .route("/:id/approve", post(approve_debt))
        .route("/:id/adjust", post(adjust_debt))
}
