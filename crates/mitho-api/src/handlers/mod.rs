//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Envelope without a payload
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Fallback for unknown routes
pub async fn route_not_found() -> AppError {
    AppError::not_found("Route not found")
}
