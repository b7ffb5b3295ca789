// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::embeddings::EmbedderError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

/// Message returned to callers for internal failures
const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Malformed or empty request content
    InvalidArgument(String),
    ValidationError {
        field: String,
        message: String,
    },
    /// The model rejected the input; same class as InvalidArgument
    ModelRejected(String),
    /// Model not ready, crashed, or the endpoint is draining
    ServiceUnavailable(String),
    Timeout,
    /// Full detail is logged, never returned to the caller
    InternalError(String),
}

impl ApiError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_)
            | ApiError::ValidationError { .. }
            | ApiError::ModelRejected(_) => "invalid_argument",
            ApiError::ServiceUnavailable(_) | ApiError::Timeout => "unavailable",
            ApiError::InternalError(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::ServiceUnavailable(_) | ApiError::Timeout)
    }

    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (message, details) = match self {
            ApiError::InvalidArgument(msg) => (msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                (message.clone(), Some(details))
            }
            ApiError::ModelRejected(msg) => (msg.clone(), None),
            ApiError::ServiceUnavailable(msg) => (msg.clone(), None),
            ApiError::Timeout => ("Embedding timed out".to_string(), None),
            ApiError::InternalError(_) => (GENERIC_INTERNAL_MESSAGE.to_string(), None),
        };

        ErrorResponse {
            error_type: self.error_type().to_string(),
            message,
            retryable: self.is_retryable(),
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_)
            | ApiError::ValidationError { .. }
            | ApiError::ModelRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) | ApiError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::ModelRejected(msg) => write!(f, "Model rejected input: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::Timeout => write!(f, "Embedding timed out"),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EmbedderError> for ApiError {
    fn from(err: EmbedderError) -> Self {
        match err {
            EmbedderError::ModelError(msg) => ApiError::ModelRejected(msg),
            EmbedderError::ModelUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            EmbedderError::Timeout(_) => ApiError::Timeout,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        if let ApiError::InternalError(detail) = &self {
            error!(request_id = %request_id, "Internal error: {}", detail);
        }

        let body = self.to_response(Some(request_id));
        (self.status_code(), Json(body)).into_response()
    }
}
