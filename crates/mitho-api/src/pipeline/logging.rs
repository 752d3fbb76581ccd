//! Request logging
//!
//! One line per request once the response is final. The level follows the
//! status class: 5xx at error, 4xx at warn, everything else at info.

use super::{RequestScope, Stage};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct LoggingStage;

#[async_trait]
impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn on_request(&self, scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        debug!(
            request_id = %scope.request_id,
            method = %scope.method,
            path = %scope.path,
            "Request started"
        );
        Ok(request)
    }

    async fn on_response(&self, scope: &mut RequestScope, response: Response) -> Response {
        let status = response.status().as_u16();
        let duration_ms = scope.started.elapsed().as_millis() as u64;
        let client_ip = scope.client.ip_address.as_deref().unwrap_or("-");
        let user_id = scope.user.as_ref().map(|u| u.user_id.to_string());

        if status >= 500 {
            error!(
                request_id = %scope.request_id,
                method = %scope.method,
                path = %scope.path,
                status,
                duration_ms,
                client_ip,
                user_id = ?user_id,
                "Request failed"
            );
        } else if status >= 400 {
            warn!(
                request_id = %scope.request_id,
                method = %scope.method,
                path = %scope.path,
                status,
                duration_ms,
                client_ip,
                user_id = ?user_id,
                "Request rejected"
            );
        } else {
            info!(
                request_id = %scope.request_id,
                method = %scope.method,
                path = %scope.path,
                status,
                duration_ms,
                client_ip,
                user_id = ?user_id,
                "Request completed"
            );
        }

        response
    }
}
