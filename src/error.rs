// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::{engine::EngineError, store::StoreError};

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // Session rule violations, status depends on the kind
    Engine(EngineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotAccessible(_) | EngineError::AssignmentClosed => StatusCode::FORBIDDEN,
        EngineError::Expired | EngineError::ImmutableState | EngineError::NotStarted => {
            StatusCode::CONFLICT
        }
        EngineError::InvalidResponseShape(_) => StatusCode::BAD_REQUEST,
        EngineError::UnknownQuestion(_) => StatusCode::NOT_FOUND,
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, kind) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                    "internal",
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg, "unauthorized"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "conflict"),
            AppError::Engine(err) => (engine_status(&err), err.to_string(), err.kind()),
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

/// Allows using `?` on store calls.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(err) => AppError::Engine(err),
            StoreError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::status::ModuleStatus;

    #[test]
    fn engine_errors_map_to_distinct_statuses() {
        let cases = [
            (
                EngineError::NotAccessible(ModuleStatus::Locked),
                StatusCode::FORBIDDEN,
            ),
            (EngineError::Expired, StatusCode::CONFLICT),
            (EngineError::ImmutableState, StatusCode::CONFLICT),
            (
                EngineError::InvalidResponseShape("x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::UnknownQuestion(3), StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn store_conflicts_are_409() {
        let err = AppError::from(StoreError::Conflict("version taken".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rejected_store_writes_surface_as_engine_errors() {
        let err = AppError::from(StoreError::Rejected(EngineError::Expired));
        assert!(matches!(err, AppError::Engine(EngineError::Expired)));
    }
}
