use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unified error type for the engine.
///
/// Precondition errors are user-correctable and surfaced verbatim;
/// validation errors are rejected before any state mutation; integrity
/// errors carry the offending entity id so the BOM data can be fixed;
/// authorization errors map to 403 so clients can render a
/// permission-specific message.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Already bound: {0}")]
    AlreadyBound(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Cyclic BOM detected at product {product_id}")]
    CyclicBom { product_id: Uuid },

    #[error("No eligible variant for BOM detail {detail_id}")]
    NoEligibleVariant { detail_id: Uuid },

    #[error("Unauthorized transition: {0}")]
    UnauthorizedTransition(String),

    #[error("Insufficient buffer: {0}")]
    InsufficientBuffer(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Single source of truth for the HTTP status of each variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::PreconditionNotMet(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::InvalidState(_) => StatusCode::CONFLICT,
            ServiceError::AlreadyBound(_) => StatusCode::CONFLICT,
            ServiceError::OutOfRange(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
            ServiceError::CyclicBom { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NoEligibleVariant { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::UnauthorizedTransition(_) => StatusCode::FORBIDDEN,
            ServiceError::InsufficientBuffer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::EventError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed to API clients. Internal failures are masked;
    /// domain errors are surfaced verbatim so the operator can act on them.
    pub fn response_message(&self) -> String {
        match self {
            ServiceError::DatabaseError(_) => "A database error occurred".to_string(),
            ServiceError::EventError(_) => "An internal event error occurred".to_string(),
            ServiceError::InternalError(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Short machine-readable error code used in the response envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::PreconditionNotMet(_) => "PRECONDITION_NOT_MET",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::AlreadyBound(_) => "ALREADY_BOUND",
            ServiceError::OutOfRange(_) => "OUT_OF_RANGE",
            ServiceError::InvalidQuantity(_) => "INVALID_QUANTITY",
            ServiceError::CyclicBom { .. } => "CYCLIC_BOM",
            ServiceError::NoEligibleVariant { .. } => "NO_ELIGIBLE_VARIANT",
            ServiceError::UnauthorizedTransition(_) => "UNAUTHORIZED_TRANSITION",
            ServiceError::InsufficientBuffer(_) => "INSUFFICIENT_BUFFER",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::ValidationError(_) => "VALIDATION_ERROR",
            ServiceError::DatabaseError(_) => "DATABASE_ERROR",
            ServiceError::EventError(_) => "EVENT_ERROR",
            ServiceError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Collapse `validator` output into a single ValidationError.
    pub fn from_validation(errors: &validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| {
                    format!(
                        "{}: {}",
                        field,
                        e.message.as_deref().unwrap_or("invalid value")
                    )
                })
            })
            .collect();
        ServiceError::ValidationError(messages.join("; "))
    }
}

/// Error envelope returned on every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "INVALID_STATE",
    "message": "Invalid state: releaseFull requires status=PARTIAL, found DRAFT",
    "details": null,
    "timestamp": "2025-06-12T08:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "INVALID_STATE")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Offending entity ids for integrity errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: chrono::DateTime<Utc>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let details = match &self {
            ServiceError::CyclicBom { product_id } => Some(json!({ "product_id": product_id })),
            ServiceError::NoEligibleVariant { detail_id } => {
                Some(json!({ "detail_id": detail_id }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.response_message(),
            details,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}
