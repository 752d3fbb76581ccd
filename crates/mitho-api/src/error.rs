//! API error handling
//!
//! Handlers and pipeline stages fail with [`AppError`]. Turning an error into
//! a response does not render a body: the error rides along as a
//! [`RecordedError`] extension and the error-translation stage of the request
//! pipeline writes the single client-facing body.
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::store::StoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

/// Message used for validation failures that carry a field map
pub const VALIDATION_MESSAGE: &str = "The given data was invalid.";

/// Message sent to clients in place of internal failure details
pub const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// Message used when the request body is not valid JSON
pub const MALFORMED_BODY_MESSAGE: &str = "Invalid request format. Please check your JSON syntax.";

/// Message used when the request body exceeds the configured limit
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "The request body is too large.";

/// Message used when a client exceeds its request rate
pub const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests. Please try again later.";

/// Field name -> messages for that field
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// API error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Always false
    pub success: bool,
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Per-field validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    /// Correlation id of the failed request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Application error taxonomy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: FieldErrors,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure without a field map
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: FieldErrors::new(),
        }
    }

    /// Validation failure for a single field
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        Self::Validation {
            message: VALIDATION_MESSAGE.to_string(),
            errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing body. Internal details never leave the process.
    pub fn to_body(&self, request_id: Option<String>) -> ApiError {
        let (message, errors) = match self {
            AppError::Validation { message, errors } => (
                message.clone(),
                (!errors.is_empty()).then(|| errors.clone()),
            ),
            AppError::Internal(_) => (INTERNAL_MESSAGE.to_string(), None),
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::TooManyRequests(msg) => (msg.clone(), None),
        };

        ApiError {
            success: false,
            code: self.code().to_string(),
            message,
            errors,
            request_id,
        }
    }
}

/// Response extension carrying the error a handler failed with
#[derive(Debug, Clone)]
pub struct RecordedError(pub AppError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status_code().into_response();
        response.extensions_mut().insert(RecordedError(self));
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Store error: {err}"))
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(format!("Password hashing error: {err}"))
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(_) | JwtError::MissingSecret => {
                AppError::Internal(format!("Token error: {err}"))
            }
            _ => AppError::Unauthorized("Invalid or expired token".to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Rejected request body");
        AppError::validation(MALFORMED_BODY_MESSAGE)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                // First failing rule per field, in declaration order
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("The {field} field is invalid."));
                (field.to_string(), vec![message])
            })
            .collect();

        AppError::Validation {
            message: VALIDATION_MESSAGE.to_string(),
            errors: fields,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        let cases = [
            (AppError::validation("x"), 422, "VALIDATION_ERROR"),
            (AppError::unauthorized("x"), 401, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), 403, "FORBIDDEN"),
            (AppError::not_found("x"), 404, "NOT_FOUND"),
            (AppError::PayloadTooLarge("x".into()), 413, "PAYLOAD_TOO_LARGE"),
            (AppError::TooManyRequests("x".into()), 429, "TOO_MANY_REQUESTS"),
            (AppError::internal("x"), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_code().as_u16(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let body = AppError::internal("connection refused on 10.0.0.3").to_body(None);
        assert_eq!(body.message, INTERNAL_MESSAGE);
        assert!(body.errors.is_none());
    }

    #[test]
    fn test_field_error_body() {
        let body = AppError::field("email", "The email field is required.")
            .to_body(Some("req-1".to_string()));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["message"], VALIDATION_MESSAGE);
        assert_eq!(json["errors"]["email"][0], "The email field is required.");
        assert_eq!(json["requestId"], "req-1");
    }

    #[test]
    fn test_into_response_records_error_without_body() {
        let response = AppError::unauthorized("nope").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let recorded = response.extensions().get::<RecordedError>().unwrap();
        assert_eq!(recorded.0, AppError::unauthorized("nope"));
    }

    #[test]
    fn test_jwt_errors_map_to_unauthorized() {
        assert!(matches!(
            AppError::from(JwtError::ExpiredToken),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            AppError::from(JwtError::MissingSecret),
            AppError::Internal(_)
        ));
    }
}
