//! Mitho API - HTTP authentication service
//!
//! Issues access/refresh token pairs, rotates refresh tokens and guards
//! protected routes. Every request runs through an explicit stage pipeline
//! (see [`pipeline`]).
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{ApiError, AppError};
pub use routes::create_router;
pub use state::AppState;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::create_router_for_testing;
