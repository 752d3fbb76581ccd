//! Request pipeline
//!
//! Every routed request passes through an ordered list of [`Stage`]s run by a
//! single driver ([`drive`]):
//!
//! 1. `on_request` in list order. A failing stage records its error and the
//!    handler and all later stages are skipped.
//! 2. The handler, with a [`RequestContext`] in its extensions.
//! 3. `on_response` in reverse order for every stage whose `on_request`
//!    succeeded.
//!
//! Stages share per-request state through [`RequestScope`].
//!
//! Author: hephaex@gmail.com

pub mod auth_guard;
pub mod case;
pub mod cors;
pub mod errors;
pub mod logging;
pub mod rate_limit;
pub mod request_id;
pub mod sanitize;
pub mod transaction;

pub use auth_guard::AuthGuardStage;
pub use case::{CaseNormalizeStage, KeyCache};
pub use cors::cors_layer;
pub use errors::ErrorTranslatorStage;
pub use logging::LoggingStage;
pub use rate_limit::rate_limited;
pub use request_id::RequestIdStage;
pub use sanitize::SanitizeStage;
pub use transaction::TransactionStage;

use crate::audit::ClientInfo;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, RecordedError, PAYLOAD_TOO_LARGE_MESSAGE};
use crate::store::UnitOfWork;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use std::sync::Arc;
use std::time::Instant;

/// Per-request state shared by all stages
#[derive(Debug)]
pub struct RequestScope {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub started: Instant,
    pub client: ClientInfo,
    /// Set by the auth guard
    pub user: Option<AuthenticatedUser>,
    /// Set by the transaction stage for mutating requests
    pub unit_of_work: Option<UnitOfWork>,
    /// Errors in the order they were recorded; the last one is rendered
    pub errors: Vec<AppError>,
}

impl RequestScope {
    pub fn new(request: &Request) -> Self {
        Self {
            request_id: String::new(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            started: Instant::now(),
            client: ClientInfo::from_headers(request.headers()),
            user: None,
            unit_of_work: None,
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, error: AppError) {
        self.errors.push(error);
    }

    pub fn last_error(&self) -> Option<&AppError> {
        self.errors.last()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn context(&self) -> RequestContext {
        RequestContext {
            request_id: self.request_id.clone(),
            user: self.user.clone(),
            unit_of_work: self.unit_of_work.clone(),
        }
    }
}

/// What handlers can see of the request scope
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub user: Option<AuthenticatedUser>,
    pub unit_of_work: Option<UnitOfWork>,
}

/// One step of the request pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_request(&self, _scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        Ok(request)
    }

    async fn on_response(&self, _scope: &mut RequestScope, response: Response) -> Response {
        response
    }
}

/// Ordered, shareable stage list
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    /// Stage names in run order
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run `request` through every stage around `handler`
    pub async fn run<F, Fut>(&self, request: Request, handler: F) -> Response
    where
        F: FnOnce(Request) -> Fut + Send,
        Fut: std::future::Future<Output = Response> + Send,
    {
        let mut scope = RequestScope::new(&request);
        let mut pending = Some(request);
        let mut entered = 0;

        for stage in self.stages.iter() {
            let Some(request) = pending.take() else {
                break;
            };
            match stage.on_request(&mut scope, request).await {
                Ok(request) => {
                    pending = Some(request);
                    entered += 1;
                }
                Err(e) => {
                    tracing::debug!(stage = stage.name(), error = %e, "Stage rejected request");
                    scope.record(e);
                    break;
                }
            }
        }

        let mut response = match pending {
            Some(mut request) => {
                request.extensions_mut().insert(scope.context());
                let mut response = handler(request).await;
                if let Some(RecordedError(e)) = response.extensions_mut().remove::<RecordedError>() {
                    scope.record(e);
                }
                response
            }
            None => scope
                .last_error()
                .map(|e| e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
        };

        for stage in self.stages[..entered].iter().rev() {
            response = stage.on_response(&mut scope, response).await;
        }

        response
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Middleware entry point: `middleware::from_fn_with_state(pipeline, drive)`
pub async fn drive(State(pipeline): State<Pipeline>, request: Request, next: Next) -> Response {
    pipeline.run(request, |request| next.run(request)).await
}

/// Whether the headers declare a JSON body
pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Buffer a request body, apply `rewrite` to it if it parses as JSON, and
/// put it back. Bodies that are not valid JSON are restored untouched.
pub(crate) async fn rewrite_json_request(
    request: Request,
    rewrite: impl FnOnce(&mut serde_json::Value) + Send,
) -> Result<Request, AppError> {
    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.map_err(body_read_error)?;

    let bytes = rewrite_bytes(bytes, rewrite);
    parts.headers.insert(header::CONTENT_LENGTH, bytes.len().into());
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Map a body read failure, surfacing the body size limit as 413
///
/// Streamed bodies without a Content-Length only hit the limit while being
/// read, so the limit error arrives wrapped in the read error.
fn body_read_error(err: axum::Error) -> AppError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return AppError::PayloadTooLarge(PAYLOAD_TOO_LARGE_MESSAGE.to_string());
        }
        source = current.source();
    }
    AppError::validation(format!("Failed to read request body: {err}"))
}

/// Same as [`rewrite_json_request`] for responses
pub(crate) async fn rewrite_json_response(
    response: Response,
    rewrite: impl FnOnce(&mut serde_json::Value) + Send,
) -> Result<Response, AppError> {
    let (mut parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| AppError::internal(format!("Failed to buffer response body: {e}")))?;

    let bytes = rewrite_bytes(bytes, rewrite);
    parts.headers.insert(header::CONTENT_LENGTH, bytes.len().into());
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

fn rewrite_bytes(bytes: Bytes, rewrite: impl FnOnce(&mut serde_json::Value)) -> Bytes {
    if bytes.is_empty() {
        return bytes;
    }
    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(mut value) => {
            rewrite(&mut value);
            serde_json::to_vec(&value).map(Bytes::from).unwrap_or(bytes)
        }
        Err(_) => bytes,
    }
}
