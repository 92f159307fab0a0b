//! Mapping from workflow errors to HTTP responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use breachflow_workflow::{ErrorKind, WorkflowError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Malformed request outside the workflow's own validation, such as a
    /// missing header.
    #[error("{0}")]
    BadRequest(String),

    /// Body that is not JSON or does not match the request type.
    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error("workflow task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Workflow(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Precondition | ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Transport => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Body(rejection) => rejection.status(),
            Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Workflow(err) => match err.kind() {
                ErrorKind::Validation => "validation_failed",
                ErrorKind::NotFound => "not_found",
                ErrorKind::Precondition => "precondition_failed",
                ErrorKind::Conflict => "conflict",
                ErrorKind::Transport => "delivery_failed",
                ErrorKind::Internal => "internal_error",
            },
            Self::BadRequest(_) => "bad_request",
            Self::Body(_) => "invalid_body",
            Self::Join(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.label(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
