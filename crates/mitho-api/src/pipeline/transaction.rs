//! Request-scoped unit of work
//!
//! Mutating requests (POST, PUT, PATCH, DELETE) get a unit of work before the
//! handler runs. It is committed when the request finished without a recorded
//! error and with a status below 400, and rolled back otherwise.

use super::{RequestScope, Stage};
use crate::error::AppError;
use crate::store::TransactionManager;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    response::Response,
};
use std::sync::Arc;

pub struct TransactionStage {
    manager: Arc<dyn TransactionManager>,
}

impl std::fmt::Debug for TransactionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStage").finish_non_exhaustive()
    }
}

impl TransactionStage {
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self { manager }
    }
}

/// Whether requests with this method get a unit of work
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[async_trait]
impl Stage for TransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn on_request(&self, scope: &mut RequestScope, request: Request) -> Result<Request, AppError> {
        if !is_mutating(request.method()) {
            return Ok(request);
        }

        let uow = self.manager.begin().await.map_err(|e| {
            tracing::error!(request_id = %scope.request_id, error = %e, "Failed to begin transaction");
            AppError::internal(format!("Failed to begin transaction: {e}"))
        })?;
        scope.unit_of_work = Some(uow);
        Ok(request)
    }

    async fn on_response(&self, scope: &mut RequestScope, mut response: Response) -> Response {
        let Some(uow) = scope.unit_of_work.take() else {
            return response;
        };

        let failed = scope.has_errors() || response.status().as_u16() >= 400;
        let (outcome, action) = if failed {
            (uow.rollback().await, "roll back")
        } else {
            (uow.commit().await, "commit")
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(request_id = %scope.request_id, action, "Transaction closed");
            }
            Err(e) => {
                tracing::error!(request_id = %scope.request_id, error = %e, "Failed to {action} transaction");
                scope.record(AppError::internal(format!("Failed to {action} transaction: {e}")));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UserDirectory};
    use axum::{body::Body, response::IntoResponse};
    use mitho_core::Identity;

    fn request(method: Method) -> Request {
        Request::builder()
            .method(method)
            .uri("/auth/logout")
            .body(Body::empty())
            .unwrap()
    }

    async fn run_with(store: &MemoryStore, status: StatusCode) -> Response {
        let stage = TransactionStage::new(Arc::new(store.clone()));
        let request = request(Method::POST);
        let mut scope = RequestScope::new(&request);
        stage.on_request(&mut scope, request).await.unwrap();

        let uow = scope.unit_of_work.clone().unwrap();
        UserDirectory::create(store, Some(&uow), Identity::new("A", "B", "a@b.com", "h"))
            .await
            .unwrap();

        stage.on_response(&mut scope, status.into_response()).await
    }

    #[tokio::test]
    async fn test_success_commits() {
        let store = MemoryStore::new();
        let response = run_with(&store, StatusCode::OK).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_server_error_rolls_back() {
        let store = MemoryStore::new();
        let response = run_with(&store, StatusCode::INTERNAL_SERVER_ERROR).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_safe_methods_get_no_unit_of_work() {
        let store = MemoryStore::new();
        let stage = TransactionStage::new(Arc::new(store));
        let request = request(Method::GET);
        let mut scope = RequestScope::new(&request);
        stage.on_request(&mut scope, request).await.unwrap();
        assert!(scope.unit_of_work.is_none());
    }

    #[tokio::test]
    async fn test_closed_unit_of_work_becomes_internal_error() {
        let store = MemoryStore::new();
        let stage = TransactionStage::new(Arc::new(store));
        let request = request(Method::DELETE);
        let mut scope = RequestScope::new(&request);
        stage.on_request(&mut scope, request).await.unwrap();

        // Something closed it behind the stage's back
        scope.unit_of_work.clone().unwrap().rollback().await.unwrap();

        let response = stage
            .on_response(&mut scope, StatusCode::OK.into_response())
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(scope.last_error(), Some(AppError::Internal(_))));
    }
}
