use actix_web::{HttpResponse, ResponseError};

use reservation_engine::{AssemblyError, GatewayError, PromotionAdminError, SubmissionError};

/// Errors returned by the HTTP handlers
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Request body failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requester has no reservation with this identifier
    #[error("Reservation {0} not found")]
    ReservationNotFound(String),

    /// The persistence API failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The reservation could not be assembled
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    /// The reservation could not be submitted
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// A promotion edit was refused
    #[error(transparent)]
    PromotionAdmin(#[from] PromotionAdminError),

    /// Unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "validation_error",
                "message": msg
            })),
            ApiError::ReservationNotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "reservation_not_found",
                "message": self.to_string()
            })),
            ApiError::Gateway(e) => e.error_response(),
            ApiError::Assembly(e) => e.error_response(),
            ApiError::Submission(e) => e.error_response(),
            ApiError::PromotionAdmin(e) => e.error_response(),
            ApiError::Internal(msg) => {
                log::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}
