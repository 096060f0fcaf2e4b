use chrono::{DateTime, Utc};

// ============= Token Types =============

/// Decoded token payload: the caller's claims plus injected timing claims.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Result of running one token through the authentication state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Token verified; carries the decoded claims.
    Success(Claims),
    /// Neither the query nor the body carried a token.
    NoToken,
    /// A token was present but failed verification.
    InvalidToken(TokenError),
}

impl AuthOutcome {
    /// Returns true only for [`AuthOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success(_))
    }
}

/// Why a presented token was rejected.
///
/// Stored on the request (see [`crate::auth::middleware::AuthFailure`]) so that
/// a `failedAuth` handler can inspect it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("jwt malformed: {0}")]
    Malformed(String),

    #[error("invalid signature")]
    SignatureMismatch,

    #[error("jwt expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("jwt not active before {not_before}")]
    NotActive { not_before: DateTime<Utc> },

    #[error("invalid algorithm")]
    InvalidAlgorithm,

    #[error("invalid token: {0}")]
    Invalid(String),
}

impl TokenError {
    /// Short machine-readable name, handy for custom fallback payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Malformed(_) => "malformed",
            TokenError::SignatureMismatch => "signature_mismatch",
            TokenError::Expired { .. } => "expired",
            TokenError::NotActive { .. } => "not_active",
            TokenError::InvalidAlgorithm => "invalid_algorithm",
            TokenError::Invalid(_) => "invalid",
        }
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Signing(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Config(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::InvalidInput(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
