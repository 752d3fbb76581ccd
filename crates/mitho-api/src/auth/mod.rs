//! Authentication module
//!
//! This module provides JWT-based authentication with the following components:
//! - Token signing and verification (access and refresh kinds)
//! - Password hashing with Argon2
//! - Refresh token records and public projections
//! - The authentication service driving signup, login, rotation and logout
//! - Extractors for authenticated handlers

pub mod extract;
pub mod jwt;
pub mod models;
pub mod password;
pub mod service;

pub use extract::{ApiJson, AuthenticatedUser, Transaction};
pub use jwt::{Claims, IssuedToken, JwtError, TokenCodec, TokenKind};
pub use models::{token_fingerprint, RefreshTokenRecord, SessionView, UserProfile};
pub use password::{Argon2Hasher, PasswordConfig, PasswordError, PasswordHasher};
pub use service::{
    AuthService, LoginRequest, LoginResponse, RefreshRequest, SignupRequest, TokenPair,
};
