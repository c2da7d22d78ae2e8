//! HTTP error responses for the webhook API.
//!
//! Errors are returned as JSON with an `error` field and, for server errors,
//! a `message` describing what failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::webhook::PayloadError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn invalid_signature() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid signature")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").with_message(message)
    }

    /// A webhook that passed verification but could not be handled.
    pub fn webhook_failure(reason: impl std::fmt::Display) -> Self {
        Self::internal(format!("Failed to process webhook: {}", reason))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "[{}] {}: {}", self.status.as_u16(), self.error, message),
            None => write!(f, "[{}] {}", self.status.as_u16(), self.error),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PayloadError> for ApiError {
    fn from(err: PayloadError) -> Self {
        tracing::error!("Failed to process webhook payload: {}", err);
        ApiError::webhook_failure(err)
    }
}
