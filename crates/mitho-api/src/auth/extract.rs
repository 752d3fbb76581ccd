//! Request extractors for authenticated handlers
//!
//! The pipeline leaves a [`RequestContext`] in the request extensions before
//! the handler runs. These extractors read it back in typed form.

use super::jwt::{Claims, JwtError};
use crate::error::AppError;
use crate::pipeline::RequestContext;
use crate::store::UnitOfWork;
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use std::convert::Infallible;
use uuid::Uuid;

/// Authenticated user information extracted from an access token
///
/// Placed in the request scope by the auth guard and extracted in handlers
/// as a plain argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// User's unique identifier
    pub user_id: Uuid,
    /// JWT token ID
    pub jti: String,
    /// When the access token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<&Claims> for AuthenticatedUser {
    type Error = JwtError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        let expires_at = i64::try_from(claims.exp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(JwtError::InvalidToken)?;

        Ok(Self {
            user_id: claims.user_id()?,
            jti: claims.jti.clone(),
            expires_at,
        })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.user.clone())
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

/// The request's unit of work, if the pipeline opened one
///
/// Handlers pass `tx.get()` to every store call so that writes commit or roll
/// back together with the request.
#[derive(Debug, Clone, Default)]
pub struct Transaction(pub Option<UnitOfWork>);

impl Transaction {
    pub fn get(&self) -> Option<&UnitOfWork> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Transaction {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Transaction(
            parts
                .extensions
                .get::<RequestContext>()
                .and_then(|ctx| ctx.unit_of_work.clone()),
        ))
    }
}

/// JSON body extractor whose rejection is an [`AppError`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenKind;

    fn claims(sub: &str) -> Claims {
        Claims {
            iss: "mitho-api".to_string(),
            sub: sub.to_string(),
            jti: "jti-1".to_string(),
            kind: TokenKind::Access,
            iat: 1_700_000_000,
            nbf: 1_700_000_000,
            exp: 1_700_003_600,
        }
    }

    #[test]
    fn test_authenticated_user_from_claims() {
        let id = Uuid::new_v4();
        let user = AuthenticatedUser::try_from(&claims(&id.to_string())).unwrap();

        assert_eq!(user.user_id, id);
        assert_eq!(user.jti, "jti-1");
        assert_eq!(user.expires_at.timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_non_uuid_subject_is_rejected() {
        assert!(AuthenticatedUser::try_from(&claims("api_user")).is_err());
    }

    #[tokio::test]
    async fn test_missing_context_is_unauthorized() {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        let result = AuthenticatedUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));

        let Transaction(tx) = Transaction::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert!(tx.is_none());
    }
}
