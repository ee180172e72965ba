use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::core::{MortuaryError, StoreError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(MortuaryError),
    /// Request body or query string could not be decoded.
    BadRequest(String),
}

impl From<MortuaryError> for ApiError {
    fn from(err: MortuaryError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        let err = match self {
            ApiError::BadRequest(_) => return (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Domain(err) => err,
        };
        match err {
            MortuaryError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            MortuaryError::ChamberNotFound(_)
            | MortuaryError::DeceasedNotFound(_)
            | MortuaryError::NoChamberAvailable => (StatusCode::NOT_FOUND, "not_found"),
            MortuaryError::ChamberUnavailable { .. } | MortuaryError::AllChambersUnavailable => {
                (StatusCode::BAD_REQUEST, "chamber_unavailable")
            }
            MortuaryError::ChamberExists(_) => (StatusCode::CONFLICT, "chamber_exists"),
            MortuaryError::ChamberOccupied { .. } => (StatusCode::CONFLICT, "chamber_occupied"),
            MortuaryError::CapacityBelowOccupancy { .. } => {
                (StatusCode::CONFLICT, "capacity_below_occupancy")
            }
            MortuaryError::UnitTaken(_) => (StatusCode::CONFLICT, "unit_taken"),
            MortuaryError::AlreadyAssigned { .. } => (StatusCode::CONFLICT, "already_assigned"),
            MortuaryError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            MortuaryError::Store(StoreError::SerializationFailure { .. }) => {
                (StatusCode::CONFLICT, "write_conflict")
            }
            MortuaryError::Store(StoreError::ConstraintViolation(_)) => {
                (StatusCode::CONFLICT, "constraint_violation")
            }
            MortuaryError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = match self {
            ApiError::BadRequest(message) => message,
            ApiError::Domain(MortuaryError::Store(StoreError::SerializationFailure { .. })) => {
                "record changed concurrently, retry the request".to_string()
            }
            ApiError::Domain(err) if status.is_server_error() => {
                error!(error = %err, "request failed");
                "storage operation failed".to_string()
            }
            ApiError::Domain(err) => err.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}
