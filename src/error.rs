use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::models::order::{OrderId, OrderStatus};
use crate::router::auth::AuthError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("no drivers available")]
    NoAvailableDrivers,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable code used in real-time `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NoAvailableDrivers => "no_drivers",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NoAvailableDrivers => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no drivers available".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Rejections from the order state machine.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {order_id} needs a driver to reach {to:?}")]
    MissingDriver { order_id: OrderId, to: OrderStatus },

    /// Another writer changed the status between read and write.
    #[error("order {0} changed concurrently")]
    Conflict(OrderId),

    /// Persistence failed; nothing was committed.
    #[error("failed to persist transition: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OrderNotFound(id) => AppError::NotFound(format!("order {id} not found")),
            StorageError::Conflict { .. } | StorageError::AlreadyExists(_) => {
                AppError::Conflict(err.to_string())
            }
            StorageError::Backend(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::OrderNotFound(id) => {
                AppError::NotFound(format!("order {id} not found"))
            }
            TransitionError::InvalidTransition { .. } | TransitionError::Conflict(_) => {
                AppError::Conflict(err.to_string())
            }
            TransitionError::MissingDriver { .. } => AppError::BadRequest(err.to_string()),
            TransitionError::Storage(inner) => AppError::Internal(inner.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}
