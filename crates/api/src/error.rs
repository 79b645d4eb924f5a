//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ProductId;
use reservation::{PlacementError, ReservationError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order placement or lookup error.
    Placement(PlacementError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, product_id) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Placement(err) => placement_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let body = match product_id {
            Some(id) => serde_json::json!({ "error": message, "product_id": id }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn placement_error_to_response(err: PlacementError) -> (StatusCode, String, Option<ProductId>) {
    let status = match &err {
        PlacementError::Validation(_) => StatusCode::BAD_REQUEST,
        PlacementError::Reservation(reservation) => match reservation {
            ReservationError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            ReservationError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::Conflict { .. } => StatusCode::CONFLICT,
            ReservationError::DeadlineExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ReservationError::OutcomeUnknown { .. } | ReservationError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        PlacementError::Persistence(_) | PlacementError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "order placement failed");
    }

    let product_id = match &err {
        PlacementError::Reservation(reservation) => reservation.product_id().cloned(),
        _ => None,
    };
    (status, err.to_string(), product_id)
}

impl From<PlacementError> for ApiError {
    fn from(err: PlacementError) -> Self {
        ApiError::Placement(err)
    }
}
