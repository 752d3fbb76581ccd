//! Bearer token guard for protected routes
//!
//! Verifies the access token carried in `Authorization: Bearer <token>` and
//! places the authenticated user in the request scope. Stateless: the store
//! is never consulted.

use super::{RequestScope, Stage};
use crate::audit::{audit_log, AuditEvent};
use crate::auth::{AuthenticatedUser, JwtError, TokenCodec, TokenKind};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::Request, http::header};
use std::sync::Arc;

pub const MISSING_HEADER_MESSAGE: &str = "Authorization header is required";
pub const MALFORMED_HEADER_MESSAGE: &str =
    "Invalid authorization header format. Expected 'Bearer <token>'";
pub const EMPTY_TOKEN_MESSAGE: &str = "Token is required";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";
pub const WRONG_KIND_MESSAGE: &str = "Invalid token type. Access token required";

#[derive(Debug, Clone)]
pub struct AuthGuardStage {
    codec: Arc<TokenCodec>,
}

impl AuthGuardStage {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    fn authenticate(&self, request: &Request) -> Result<AuthenticatedUser, (AppError, String)> {
        let reject = |message: &str, reason: String| (AppError::unauthorized(message), reason);

        let value = request
            .headers()
            .get(header::AUTHORIZATION)
            .ok_or_else(|| reject(MISSING_HEADER_MESSAGE, "missing header".to_string()))?;

        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| reject(MALFORMED_HEADER_MESSAGE, "malformed header".to_string()))?
            .trim();

        if token.is_empty() {
            return Err(reject(EMPTY_TOKEN_MESSAGE, "empty token".to_string()));
        }

        let claims = self.codec.verify(token, TokenKind::Access).map_err(|e| {
            let message = match e {
                JwtError::WrongKind { .. } => WRONG_KIND_MESSAGE,
                _ => INVALID_TOKEN_MESSAGE,
            };
            reject(message, e.to_string())
        })?;

        AuthenticatedUser::try_from(&claims).map_err(|e| reject(INVALID_TOKEN_MESSAGE, e.to_string()))
    }
}

#[async_trait]
impl Stage for AuthGuardStage {
    fn name(&self) -> &'static str {
        "auth_guard"
    }

    async fn on_request(&self, scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        match self.authenticate(&request) {
            Ok(user) => {
                scope.user = Some(user);
                Ok(request)
            }
            Err((error, reason)) => {
                audit_log(&AuditEvent::InvalidToken {
                    reason,
                    ip_address: scope.client.ip_address.clone(),
                    user_agent: scope.client.user_agent.clone(),
                });
                Err(error)
            }
        }
    }
}
