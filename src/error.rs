//! Service error taxonomy and its HTTP mapping.
//!
//! Store implementations return `anyhow` errors; the services wrap them into
//! [`ServiceError`] without retrying, so the caller sees the original cause.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

// ---

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    // ---
    /// Malformed or missing input (ids, period, dates, reading values).
    #[error("{0}")]
    Validation(String),

    /// A farm or system id did not resolve.
    #[error("{0}")]
    NotFound(String),

    /// A store read for live or precomputed aggregation failed.
    #[error("failed to read aggregated data: {0:#}")]
    Aggregation(anyhow::Error),

    /// A single or bulk insert failed. Nothing from the batch was persisted.
    #[error("failed to insert data: {0:#}")]
    Insert(anyhow::Error),

    /// A long-running synthetic run was aborted before it wrote anything.
    #[error("operation cancelled")]
    Cancelled,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    // ---
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Aggregation(_) | ServiceError::Insert(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to clients. Store failures are reported with a stable
    /// text; the underlying cause only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Validation(msg) | ServiceError::NotFound(msg) => msg.clone(),
            ServiceError::Aggregation(_) => "Error on getting aggregated data".to_string(),
            ServiceError::Insert(_) => "Error on inserting data".to_string(),
            ServiceError::Cancelled => "Operation cancelled".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
