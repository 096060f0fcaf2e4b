//! In-memory user records for the demo server.
//!
//! Records are schemaless JSON objects, the way the signup form sends them.
//! Each stored record gets an `_id`.

use crate::types::{AppError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored user record.
pub type UserRecord = Map<String, Value>;

/// Storage used by the demo routes.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Stores `record`, assigning an `_id`, and returns the stored copy.
    async fn insert(&self, record: UserRecord) -> Result<UserRecord>;

    /// First record whose `username` equals `username`.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// All records in insertion order.
    async fn list(&self) -> Result<Vec<UserRecord>>;
}

/// `UserStore` kept in process memory; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, mut record: UserRecord) -> Result<UserRecord> {
        if record.get("username").and_then(Value::as_str).is_none() {
            return Err(AppError::InvalidInput("username is required".to_string()));
        }
        record.insert(
            "_id".to_string(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
        self.users.write().push(record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .iter()
            .find(|user| user.get("username").and_then(Value::as_str) == Some(username))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        Ok(self.users.read().clone())
    }
}
