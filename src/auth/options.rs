//! Middleware configuration and per-call signing options.

use super::expiration::TokenExpiration;
use super::handlers::{FailedAuth, FallbackHandler, RequireToken};
use crate::types::{AppError, Result};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key for the lifetime applied to newly generated tokens.
pub const TOKEN_EXPIRATION: &str = "tokenExpiration";
/// Key for the handler run when a request carries no token.
pub const REQUIRE_TOKEN: &str = "requireToken";
/// Key for the handler run when a token fails verification.
pub const FAILED_AUTH: &str = "failedAuth";

/// A configuration value as read and written through `get`/`set`.
#[derive(Clone)]
pub enum AuthOption {
    Expiration(TokenExpiration),
    Handler(Arc<dyn FallbackHandler>),
    Value(serde_json::Value),
}

impl AuthOption {
    /// Wraps a fallback handler.
    pub fn handler(handler: impl FallbackHandler + 'static) -> Self {
        AuthOption::Handler(Arc::new(handler))
    }

    pub fn as_expiration(&self) -> Option<&TokenExpiration> {
        match self {
            AuthOption::Expiration(expiration) => Some(expiration),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Arc<dyn FallbackHandler>> {
        match self {
            AuthOption::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            AuthOption::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOption::Expiration(expiration) => {
                f.debug_tuple("Expiration").field(expiration).finish()
            }
            AuthOption::Handler(_) => f.write_str("Handler(..)"),
            AuthOption::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<TokenExpiration> for AuthOption {
    fn from(expiration: TokenExpiration) -> Self {
        AuthOption::Expiration(expiration)
    }
}

impl From<serde_json::Value> for AuthOption {
    fn from(value: serde_json::Value) -> Self {
        AuthOption::Value(value)
    }
}

impl From<&str> for AuthOption {
    fn from(value: &str) -> Self {
        AuthOption::Value(serde_json::Value::String(value.to_string()))
    }
}

impl From<Arc<dyn FallbackHandler>> for AuthOption {
    fn from(handler: Arc<dyn FallbackHandler>) -> Self {
        AuthOption::Handler(handler)
    }
}

/// Configuration owned by one middleware instance.
///
/// Cloning is cheap; handlers are shared.
#[derive(Clone)]
pub struct AuthOptions {
    pub token_expiration: TokenExpiration,
    pub require_token: Arc<dyn FallbackHandler>,
    pub failed_auth: Arc<dyn FallbackHandler>,
    /// Unrecognised keys, kept verbatim and never consulted.
    pub extra: HashMap<String, AuthOption>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            token_expiration: TokenExpiration::default(),
            require_token: Arc::new(RequireToken),
            failed_auth: Arc::new(FailedAuth),
            extra: HashMap::new(),
        }
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("token_expiration", &self.token_expiration)
            .field("extra", &self.extra)
            .finish_non_exhaustive()
    }
}

impl AuthOptions {
    /// Reads one option by key.
    pub fn get(&self, key: &str) -> Option<AuthOption> {
        match key {
            TOKEN_EXPIRATION => Some(AuthOption::Expiration(self.token_expiration.clone())),
            REQUIRE_TOKEN => Some(AuthOption::Handler(Arc::clone(&self.require_token))),
            FAILED_AUTH => Some(AuthOption::Handler(Arc::clone(&self.failed_auth))),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Writes one option by key.
    ///
    /// Recognised keys only accept values of their kind; on error nothing changes.
    pub fn set(&mut self, key: &str, value: AuthOption) -> Result<()> {
        match key {
            TOKEN_EXPIRATION => {
                self.token_expiration = expiration_from_option(value)?;
            }
            REQUIRE_TOKEN => {
                self.require_token = handler_from_option(key, value)?;
            }
            FAILED_AUTH => {
                self.failed_auth = handler_from_option(key, value)?;
            }
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }
}

fn expiration_from_option(value: AuthOption) -> Result<TokenExpiration> {
    match value {
        AuthOption::Expiration(expiration) => Ok(expiration),
        AuthOption::Value(serde_json::Value::String(text)) => TokenExpiration::parse(&text)
            .map_err(|e| AppError::Config(format!("{TOKEN_EXPIRATION}: {e}"))),
        AuthOption::Value(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(TokenExpiration::from_secs)
            .ok_or_else(|| {
                AppError::Config(format!("{TOKEN_EXPIRATION}: {n} is not a whole number of seconds"))
            }),
        other => Err(AppError::Config(format!(
            "{TOKEN_EXPIRATION} expects a duration, got {other:?}"
        ))),
    }
}

fn handler_from_option(key: &str, value: AuthOption) -> Result<Arc<dyn FallbackHandler>> {
    match value {
        AuthOption::Handler(handler) => Ok(handler),
        other => Err(AppError::Config(format!(
            "{key} expects a fallback handler, got {other:?}"
        ))),
    }
}

/// Options for a single `generate_token` call.
///
/// Expiration is not among them: it always comes from the middleware's
/// `tokenExpiration` setting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenOptions {
    /// HMAC algorithm; HS256 when unset.
    pub algorithm: Option<Algorithm>,
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub jwt_id: Option<String>,
    /// Delay before the token becomes valid.
    pub not_before: Option<TokenExpiration>,
    /// Written to the header as `kid`.
    pub key_id: Option<String>,
    /// Leave `iat` out of the payload.
    pub no_timestamp: bool,
}

impl TokenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_jwt_id(mut self, jwt_id: impl Into<String>) -> Self {
        self.jwt_id = Some(jwt_id.into());
        self
    }

    pub fn with_not_before(mut self, not_before: TokenExpiration) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn without_timestamp(mut self) -> Self {
        self.no_timestamp = true;
        self
    }
}
