//! API route definitions
//!
//! Public and protected routes run through their own stage pipelines. The
//! credential endpoints are rate limited per client. CORS, the request
//! timeout and the body size limit wrap everything.
//!
//! Author: hephaex@gmail.com

use crate::docs::openapi_json;
use crate::handlers::{auth, health, route_not_found};
use crate::pipeline::{
    drive, rate_limited, AuthGuardStage, CaseNormalizeStage, ErrorTranslatorStage, LoggingStage, Pipeline,
    RequestIdStage, SanitizeStage, Stage, TransactionStage,
};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Stages every routed request passes through
fn base_stages(state: &AppState) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(RequestIdStage),
        Arc::new(LoggingStage),
        Arc::new(ErrorTranslatorStage),
        Arc::new(SanitizeStage::new()),
        Arc::new(CaseNormalizeStage::new(state.key_cache.clone())),
    ]
}

/// Pipeline for routes that need no authentication
pub fn public_pipeline(state: &AppState) -> Pipeline {
    Pipeline::new(base_stages(state))
}

/// Pipeline for routes behind the bearer token guard
pub fn protected_pipeline(state: &AppState) -> Pipeline {
    let mut stages = base_stages(state);
    stages.push(Arc::new(AuthGuardStage::new(state.codec.clone())));
    stages.push(Arc::new(TransactionStage::new(state.transactions.clone())));
    Pipeline::new(stages)
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints, limited per client inside the public pipeline
    let credential_routes = rate_limited(
        Router::new()
            .route("/auth/signup", post(auth::signup_handler))
            .route("/auth/login", post(auth::login_handler))
            .route("/auth/refresh", post(auth::refresh_handler)),
        &state.config.server,
    );

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(credential_routes)
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(
            public_pipeline(&state),
            drive,
        ));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/sessions", get(auth::sessions_handler))
        .route_layer(middleware::from_fn_with_state(
            protected_pipeline(&state),
            drive,
        ));

    // The document keeps its own key casing
    let docs_routes = Router::new().route("/api-docs/openapi.json", get(openapi_json));

    let server = state.config.server.clone();
    let mut app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(docs_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )));

    if server.cors_enabled {
        app = app.layer(crate::pipeline::cors_layer(&server));
    }

    app.layer(RequestBodyLimitLayer::new(server.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
