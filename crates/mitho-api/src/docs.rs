//! OpenAPI document
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    LoginRequest, LoginResponse, RefreshRequest, SessionView, SignupRequest, TokenPair,
    UserProfile,
};
use crate::error::ApiError;
use crate::handlers::{auth, health};
use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mitho API",
        description = "Credential lifecycle service: signup, login, refresh token rotation and logout"
    ),
    paths(
        health::health_check,
        auth::signup_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::me_handler,
        auth::sessions_handler,
    ),
    components(schemas(
        SignupRequest,
        LoginRequest,
        RefreshRequest,
        LoginResponse,
        TokenPair,
        UserProfile,
        SessionView,
        health::HealthResponse,
        ApiError,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serve the OpenAPI document
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
