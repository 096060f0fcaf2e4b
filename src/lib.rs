//! # tokengate - Token Authentication Middleware
//!
//! Issues signed, time-bound tokens carrying arbitrary claims and verifies
//! them on inbound axum requests, attaching the decoded claims for
//! downstream handlers.
//!
//! ## Overview
//!
//! tokengate can be used in two ways:
//!
//! 1. **As a library** - Put [`auth::required`] in front of your own routes
//! 2. **As a demo server** - Run the `tokengate-server` binary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use axum::{middleware, routing::get, Router};
//! use serde_json::json;
//! use tokengate::auth::{required, AuthData, AuthMiddleware, TokenOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = AuthMiddleware::new("s3cr3t");
//!     auth.set("tokenExpiration", "1h")?;
//!
//!     let token = auth
//!         .generate_token(&json!({ "username": "a" }), TokenOptions::default())
//!         .await?;
//!     println!("GET /me?token={token}");
//!
//!     let app: Router = Router::new()
//!         .route("/me", get(|data: AuthData| async move { axum::Json(data.0) }))
//!         .layer(middleware::from_fn_with_state(auth.clone(), required));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - Middleware, token signing/verification, fallback handlers
//! - [`api`] - Demo REST handlers and routes
//! - [`db`] - In-memory user store for the demo
//! - [`types`] - Common types and error handling
//! - [`utils`] - TOML configuration with hot reload

#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Token authentication and middleware.
pub mod auth;
/// Command-line interface.
pub mod cli;
/// User storage for the demo server.
pub mod db;
/// Core types (outcomes, errors).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use auth::{AuthMiddleware, TokenOptions};
pub use types::{AppError, AuthOutcome, Result, TokenError};
pub use utils::toml_config::{ConfigManager, TokenGateConfig};

use crate::db::UserStore;
use std::sync::Arc;

/// Creates an authentication middleware for `secret` with default options.
pub fn create_auth_middleware(secret: impl AsRef<[u8]>) -> AuthMiddleware {
    AuthMiddleware::new(secret)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Token issuance and verification
    pub auth: AuthMiddleware,
    /// User records for signup/login
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub fn new(auth: AuthMiddleware, users: Arc<dyn UserStore>) -> Self {
        Self { auth, users }
    }
}
