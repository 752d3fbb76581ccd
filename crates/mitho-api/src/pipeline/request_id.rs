//! Request correlation id
//!
//! Reuses a well-formed incoming `X-Request-ID`, otherwise generates a UUID.
//! The id is echoed on the response.

use super::{RequestScope, Stage};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_INCOMING_LEN: usize = 128;

#[derive(Debug, Default)]
pub struct RequestIdStage;

fn accept_incoming(value: &HeaderValue) -> Option<String> {
    let id = value.to_str().ok()?.trim();
    let well_formed = !id.is_empty()
        && id.len() <= MAX_INCOMING_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    well_formed.then(|| id.to_string())
}

#[async_trait]
impl Stage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    async fn on_request(&self, scope: &mut RequestScope, mut request: Request) -> Result<Request, AppError> {
        let id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(accept_incoming)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Ok(value) = HeaderValue::from_str(&id) {
            request.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }
        scope.request_id = id;
        Ok(request)
    }

    async fn on_response(&self, scope: &mut RequestScope, mut response: Response) -> Response {
        if let Ok(value) = HeaderValue::from_str(&scope.request_id) {
            response.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }
        response
    }
}
