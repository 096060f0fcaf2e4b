//! HTTP API Handlers and Routes
//!
//! A small example API showing the middleware in front of real routes.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! - `GET /` - Public welcome message
//! - `POST /signup` - Register a user (JSON or form body)
//! - `POST /login` - Exchange username/password for an access token
//! - `GET|POST /users` - List users; requires a token
//!
//! # Authentication
//!
//! Protected endpoints read the token from the `token` query parameter or
//! the `token` body field:
//! ```text
//! GET /users?token=<token>
//! ```

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
