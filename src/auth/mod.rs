//! Token Authentication and Middleware
//!
//! This module issues signed, time-bound tokens for arbitrary claims and
//! verifies them on inbound requests.
//!
//! # Module Structure
//!
//! - [`auth::middleware`](crate::auth::middleware) - `AuthMiddleware`, the `required` layer, token extraction
//! - [`auth::jwt`](crate::auth::jwt) - HMAC signing and verification
//! - [`auth::handlers`](crate::auth::handlers) - Fallback handlers for missing and invalid tokens
//! - [`auth::options`](crate::auth::options) - Configuration keys and per-call signing options
//! - [`auth::expiration`](crate::auth::expiration) - Token lifetimes such as `"24h"`
//!
//! # Usage
//!
//! ## Token Generation
//!
//! ```ignore
//! use tokengate::auth::{AuthMiddleware, TokenOptions};
//!
//! let auth = AuthMiddleware::new("s3cr3t");
//! let token = auth
//!     .generate_token(&json!({ "username": "a" }), TokenOptions::default())
//!     .await?;
//! ```
//!
//! ## Middleware
//!
//! The token is read from the `token` query parameter, or from the `token`
//! field of a JSON or form body when the query has none. On success the
//! decoded claims are stored as [`AuthData`] in the request extensions:
//!
//! ```ignore
//! use axum::middleware;
//! use tokengate::auth::required;
//!
//! let app = Router::new()
//!     .route("/users", get(handler))
//!     .layer(middleware::from_fn_with_state(auth.clone(), required));
//!
//! async fn handler(auth_data: AuthData) -> impl IntoResponse {
//!     format!("Hello, {}!", auth_data.get_str("username").unwrap_or("stranger"))
//! }
//! ```
//!
//! ## Fallbacks
//!
//! Without a token the `requireToken` handler answers `{"error": "token_required"}`;
//! with a bad one the `failedAuth` handler answers `{"error": "token_invalid"}`.
//! Both can be replaced at any time:
//!
//! ```ignore
//! auth.set("failedAuth", AuthOption::handler(fallback_fn(|req, _next| async move {
//!     let reason = AuthFailure::from_request(&req).map(|e| e.kind()).unwrap_or("unknown");
//!     (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
//! })))?;
//! ```

/// Token lifetimes.
pub mod expiration;
/// Fallback handlers for requests that do not authenticate.
pub mod handlers;
/// Token signing and verification.
pub mod jwt;
/// Authentication middleware and extractors for protected routes.
pub mod middleware;
/// Middleware configuration and signing options.
pub mod options;

pub use expiration::{ExpirationError, TokenExpiration};
pub use handlers::{fallback_fn, FailedAuth, FallbackFn, FallbackHandler, RequireToken};
pub use jwt::{Secret, TokenService};
pub use middleware::{extract_token, required, AuthData, AuthFailure, AuthMiddleware};
pub use options::{
    AuthOption, AuthOptions, TokenOptions, FAILED_AUTH, REQUIRE_TOKEN, TOKEN_EXPIRATION,
};
