//! Error translation
//!
//! The only place an error becomes a response body. When the scope holds any
//! recorded error, the last one decides the status and the body; the response
//! produced by the handler is discarded apart from its headers.

use super::{RequestScope, Stage};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::Response,
};

#[derive(Debug, Default)]
pub struct ErrorTranslatorStage;

#[async_trait]
impl Stage for ErrorTranslatorStage {
    fn name(&self) -> &'static str {
        "error_translator"
    }

    async fn on_response(&self, scope: &mut RequestScope, response: Response) -> Response {
        let Some(error) = scope.last_error() else {
            return response;
        };

        for e in &scope.errors {
            if let AppError::Internal(detail) = e {
                tracing::error!(request_id = %scope.request_id, error = %detail, "Internal error");
            }
        }

        let body = error.to_body(Some(scope.request_id.clone()));
        let bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize error body");
                Vec::new()
            }
        };

        let (mut parts, _) = response.into_parts();
        parts.status = error.status_code();
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        parts.headers.insert(header::CONTENT_LENGTH, bytes.len().into());
        Response::from_parts(parts, Body::from(bytes))
    }
}
