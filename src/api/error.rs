use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::disaggregation::DisaggregationError;
use crate::ml::ModelError;
use crate::pipeline::PipelineError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request the core cannot act on
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Unprocessable(_) => "Unprocessable",
            ApiError::Conflict(_) => "Conflict",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ApiError::InternalError(_) => {
                tracing::error!(error = %self, "API error occurred");
                "An internal error occurred".to_string()
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: self.error_type().to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

// Conversion from core error types

impl From<DisaggregationError> for ApiError {
    fn from(error: DisaggregationError) -> Self {
        match error {
            DisaggregationError::InfeasibleConstraints { .. } => ApiError::Unprocessable(error.to_string()),
            DisaggregationError::InvalidInput(_) => ApiError::BadRequest(error.to_string()),
            DisaggregationError::NotConverged { .. } => ApiError::InternalError(error.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::MalformedRecord { .. } | PipelineError::EmptyDataset => {
                ApiError::Unprocessable(error.to_string())
            }
            PipelineError::UnknownColumn(_) | PipelineError::InvalidJson(_) => {
                ApiError::BadRequest(error.to_string())
            }
            PipelineError::Io { .. } | PipelineError::Json { .. } => {
                ApiError::InternalError(error.to_string())
            }
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::UntrainedModel => ApiError::Conflict(error.to_string()),
            ModelError::InsufficientData(_)
            | ModelError::ShapeMismatch { .. }
            | ModelError::InvalidConfig(_) => ApiError::Unprocessable(error.to_string()),
            ModelError::Pipeline(inner) => inner.into(),
            ModelError::Backend(_) => ApiError::InternalError(error.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Unprocessable(errors.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(error: tokio::task::JoinError) -> Self {
        ApiError::InternalError(format!("background task failed: {error}"))
    }
}
