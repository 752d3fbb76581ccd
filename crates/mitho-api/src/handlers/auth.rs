//! Authentication API handlers
//!
//! Request bodies arrive here already sanitized and with snake_case keys; the
//! pipeline turns response keys back into camelCase.
//!
//! Author: hephaex@gmail.com

use super::ApiResponse;
use crate::audit::ClientInfo;
use crate::auth::{
    ApiJson, AuthenticatedUser, LoginRequest, RefreshRequest, SignupRequest, Transaction,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

pub const SIGNUP_MESSAGE: &str = "User created successfully. Please check your email to verify your account and set your password.";

/// Register a new user account
///
/// Creates an inactive customer account. The account cannot log in until the
/// email is verified and a password is set.
///
/// # Responses
///
/// * `201 Created` - Account created
/// * `422 Unprocessable Entity` - Invalid input or email already registered
/// * `500 Internal Server Error` - Server error
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created, pending verification"),
        (status = 422, description = "Invalid input", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError),
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    tx: Transaction,
    client: ClientInfo,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.signup(tx.get(), request, &client).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::message(SIGNUP_MESSAGE))))
}

/// Login with email and password
///
/// Returns an access token and a refresh token.
///
/// # Responses
///
/// * `200 OK` - Authentication successful
/// * `401 Unauthorized` - Invalid credentials or inactive account
/// * `404 Not Found` - No account with this email
/// * `422 Unprocessable Entity` - Invalid input
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 422, description = "Invalid input", body = ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    tx: Transaction,
    client: ClientInfo,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth.login(tx.get(), request, &client).await?;

    Ok(Json(ApiResponse::ok("Login successful", response)))
}

/// Rotate a refresh token
///
/// The presented refresh token is revoked and a new pair is issued. A
/// refresh token can be used at most once.
///
/// # Responses
///
/// * `200 OK` - New tokens issued
/// * `401 Unauthorized` - Invalid, expired, revoked or reused refresh token
/// * `422 Unprocessable Entity` - Missing refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = TokenPair),
        (status = 401, description = "Invalid refresh token", body = ApiError),
        (status = 422, description = "Invalid input", body = ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    tx: Transaction,
    client: ClientInfo,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state.auth.refresh(tx.get(), request, &client).await?;

    Ok(Json(ApiResponse::ok("Token refreshed successfully", pair)))
}

/// Logout from every session
///
/// Revokes all refresh tokens of the caller. Access tokens stay valid until
/// they expire.
///
/// # Responses
///
/// * `200 OK` - Logout successful
/// * `401 Unauthorized` - Invalid or missing authentication
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    tx: Transaction,
    client: ClientInfo,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(tx.get(), user.user_id, &client).await?;

    Ok(Json(ApiResponse::message("Logout successful")))
}

/// Get current user profile
///
/// # Responses
///
/// * `200 OK` - Profile of the authenticated user
/// * `401 Unauthorized` - Invalid or missing authentication
/// * `404 Not Found` - The user no longer exists
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    tx: Transaction,
) -> Result<impl IntoResponse, AppError> {
    let profile = state.auth.me(tx.get(), user.user_id).await?;

    Ok(Json(ApiResponse::ok("User retrieved successfully", profile)))
}

/// List refresh token sessions of the current user
///
/// # Responses
///
/// * `200 OK` - Sessions, newest first
/// * `401 Unauthorized` - Invalid or missing authentication
#[utoipa::path(
    get,
    path = "/auth/sessions",
    tag = "auth",
    responses(
        (status = 200, description = "Sessions of the current user", body = [SessionView]),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn sessions_handler(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    tx: Transaction,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.auth.sessions(tx.get(), user.user_id).await?;

    Ok(Json(ApiResponse::ok("Sessions retrieved successfully", sessions)))
}
