//! Per-client rate limiting for the credential endpoints
//!
//! Signup, login and refresh sit behind a token bucket keyed by client IP
//! (`X-Forwarded-For`, `X-Real-IP`, `Forwarded`, then the peer address). A
//! rejected request is recorded as [`AppError::TooManyRequests`] so the error
//! translator renders it like any other failure, keeping the `Retry-After`
//! header the limiter set.

use crate::error::{AppError, RecordedError, TOO_MANY_REQUESTS_MESSAGE};
use axum::{http::StatusCode, middleware, response::Response, Router};
use mitho_core::ServerConfig;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

/// Put `routes` behind the configured rate limit, if enabled
pub fn rate_limited<S>(routes: Router<S>, server: &ServerConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !server.rate_limit_enabled {
        return routes;
    }

    let Some(config) = GovernorConfigBuilder::default()
        .per_second(server.rate_limit_replenish_secs)
        .burst_size(server.rate_limit_burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
    else {
        tracing::warn!(
            replenish_secs = server.rate_limit_replenish_secs,
            burst = server.rate_limit_burst,
            "Invalid rate limit settings; credential routes are not limited"
        );
        return routes;
    };

    routes
        .route_layer(GovernorLayer {
            config: Arc::new(config),
        })
        .route_layer(middleware::map_response(record_rejection))
}

/// Turn the limiter's plain 429 into a recorded error
async fn record_rejection(mut response: Response) -> Response {
    if response.status() == StatusCode::TOO_MANY_REQUESTS
        && response.extensions().get::<RecordedError>().is_none()
    {
        tracing::debug!("Client exceeded the credential rate limit");
        response.extensions_mut().insert(RecordedError(AppError::TooManyRequests(
            TOO_MANY_REQUESTS_MESSAGE.to_string(),
        )));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request, routing::post};
    use tower::ServiceExt;

    fn app(server: &ServerConfig) -> Router {
        rate_limited(Router::new().route("/auth/login", post(|| async { "ok" })), server)
    }

    fn login_from(ip: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_burst_then_rejection_is_recorded() {
        let server = ServerConfig {
            rate_limit_replenish_secs: 60,
            rate_limit_burst: 2,
            ..ServerConfig::default()
        };
        let app = app(&server);

        for _ in 0..2 {
            let response = app.clone().oneshot(login_from("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(login_from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let recorded = response.extensions().get::<RecordedError>().unwrap();
        assert_eq!(recorded.0.code(), "TOO_MANY_REQUESTS");

        // Other clients have their own bucket
        let response = app.oneshot(login_from("10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disabled_limit_leaves_routes_alone() {
        let server = ServerConfig {
            rate_limit_enabled: false,
            rate_limit_burst: 1,
            ..ServerConfig::default()
        };
        let app = app(&server);

        for _ in 0..5 {
            let response = app.clone().oneshot(login_from("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
