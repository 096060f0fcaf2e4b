//! Storage used by the demo server.
//!
//! The authentication middleware itself stores nothing; tokens are
//! self-contained. This module only backs the signup/login example routes.

pub mod users;

pub use users::{MemoryUserStore, UserRecord, UserStore};
