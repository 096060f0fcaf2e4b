use crate::auth::expiration::TokenExpiration;
use crate::auth::handlers::FallbackHandler;
use crate::auth::jwt::{Secret, TokenService};
use crate::auth::options::{AuthOption, AuthOptions, TokenOptions};
use crate::types::{AppError, AuthOutcome, Claims, Result, TokenError};
use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{de::DeserializeOwned, Serialize};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Name of the query parameter and body field carrying the token.
pub const TOKEN_FIELD: &str = "token";

/// Largest body read while looking for a token.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Token authentication for one secret.
///
/// Cloning shares the secret and configuration, so a clone can be handed to
/// `axum::middleware::from_fn_with_state` while the original keeps issuing
/// tokens and accepting `set` calls.
#[derive(Clone)]
pub struct AuthMiddleware {
    tokens: Arc<TokenService>,
    options: Arc<ArcSwap<AuthOptions>>,
    body_limit: usize,
}

impl AuthMiddleware {
    /// Creates a middleware with default options for `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            tokens: Arc::new(TokenService::new(Secret::new(secret))),
            options: Arc::new(ArcSwap::from_pointee(AuthOptions::default())),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Caps how much of a request body is buffered when searching for a token.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    // ============= Configuration =============

    /// Current value of `key`, or `None` if it was never set.
    pub fn get(&self, key: &str) -> Option<AuthOption> {
        self.options.load().get(key)
    }

    /// Replaces `key`. Takes effect for every request that starts afterwards.
    pub fn set(&self, key: &str, value: impl Into<AuthOption>) -> Result<()> {
        let value = value.into();
        let mut result = Ok(());
        self.options.rcu(|current| {
            let mut next = AuthOptions::clone(current);
            result = next.set(key, value.clone());
            next
        });
        if result.is_ok() {
            debug!(key, "auth option updated");
        }
        result
    }

    /// Snapshot of the whole configuration.
    pub fn options(&self) -> Arc<AuthOptions> {
        self.options.load_full()
    }

    pub fn token_expiration(&self) -> TokenExpiration {
        self.options.load().token_expiration.clone()
    }

    pub fn set_token_expiration(&self, expiration: TokenExpiration) {
        self.options.rcu(|current| {
            let mut next = AuthOptions::clone(current);
            next.token_expiration = expiration.clone();
            next
        });
    }

    /// Installs the handler run when a request carries no token.
    pub fn on_missing_token(&self, handler: impl FallbackHandler + 'static) {
        let handler: Arc<dyn FallbackHandler> = Arc::new(handler);
        self.options.rcu(|current| {
            let mut next = AuthOptions::clone(current);
            next.require_token = Arc::clone(&handler);
            next
        });
    }

    /// Installs the handler run when a token fails verification.
    pub fn on_invalid_token(&self, handler: impl FallbackHandler + 'static) {
        let handler: Arc<dyn FallbackHandler> = Arc::new(handler);
        self.options.rcu(|current| {
            let mut next = AuthOptions::clone(current);
            next.failed_auth = Arc::clone(&handler);
            next
        });
    }

    // ============= Tokens =============

    /// Issues a token for `claims`, expiring after the configured `tokenExpiration`.
    ///
    /// Signing runs on the blocking pool. Errors surface as [`AppError::Signing`],
    /// or [`AppError::Internal`] if the signing task itself fails.
    pub async fn generate_token<C>(&self, claims: &C, options: TokenOptions) -> Result<String>
    where
        C: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(claims)
            .map_err(|e| AppError::Signing(format!("claims are not serializable: {e}")))?;
        let expiration = self.token_expiration();
        let tokens = Arc::clone(&self.tokens);

        tokio::task::spawn_blocking(move || tokens.sign(payload, &options, &expiration))
            .await
            .map_err(|e| AppError::Internal(format!("signing task failed: {e}")))?
    }

    /// Verifies `token` against this instance's secret.
    ///
    /// Runs inline: one HMAC over a token-sized input, no key parsing.
    pub async fn verify_token(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        self.tokens.verify(token)
    }

    /// Runs the authentication decision for an already extracted token.
    pub async fn authenticate(&self, token: Option<&str>) -> AuthOutcome {
        match token {
            None => AuthOutcome::NoToken,
            Some(token) => match self.verify_token(token).await {
                Ok(claims) => AuthOutcome::Success(claims),
                Err(err) => AuthOutcome::InvalidToken(err),
            },
        }
    }

    // ============= Request Handling =============

    /// Authenticates `req` and either continues the chain or hands it to a
    /// fallback handler.
    ///
    /// Handlers are taken from the configuration snapshot current when the
    /// request arrives.
    pub async fn handle(&self, req: Request, next: Next) -> Response {
        let options = self.options.load_full();
        let (mut req, token) = extract_token(req, self.body_limit).await;

        match self.authenticate(token.as_deref()).await {
            AuthOutcome::Success(claims) => {
                req.extensions_mut().insert(AuthData(claims));
                next.run(req).await
            }
            AuthOutcome::NoToken => options.require_token.handle(req, next).await,
            AuthOutcome::InvalidToken(err) => {
                req.extensions_mut().insert(AuthFailure(err));
                options.failed_auth.handle(req, next).await
            }
        }
    }
}

impl std::fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthMiddleware")
            .field("options", &self.options.load_full())
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

/// Axum middleware requiring a valid token.
///
/// ```ignore
/// let protected = Router::new()
///     .route("/users", get(list_users))
///     .layer(middleware::from_fn_with_state(auth.clone(), required));
/// ```
pub async fn required(State(auth): State<AuthMiddleware>, req: Request, next: Next) -> Response {
    auth.handle(req, next).await
}

// ============= Token Extraction =============

/// Finds the token in the query string, falling back to the body.
///
/// The returned request always carries the complete original body. A body
/// larger than `body_limit` is not searched; whatever was read of it is
/// replayed ahead of the unread remainder.
pub async fn extract_token(req: Request, body_limit: usize) -> (Request, Option<String>) {
    if let Some(token) = req.uri().query().and_then(token_from_query) {
        return (req, Some(token));
    }

    let Some(kind) = body_kind(&req) else {
        return (req, None);
    };

    if content_length(&req).is_some_and(|len| len > body_limit) {
        debug!(body_limit, "request body exceeds limit; not searched for a token");
        return (req, None);
    }

    let (parts, body) = req.into_parts();
    let bytes = match buffer_body(body, body_limit).await {
        Buffered::Complete(bytes) => bytes,
        Buffered::Partial(body) => {
            debug!(body_limit, "request body not searched for a token");
            return (Request::from_parts(parts, body), None);
        }
    };

    let token = match kind {
        BodyKind::Json => token_from_json(&bytes),
        BodyKind::Form => token_from_form(&bytes),
    };

    (Request::from_parts(parts, Body::from(bytes)), token)
}

enum Buffered {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// Limit exceeded or read failed; the body rebuilt from what was read.
    Partial(Body),
}

async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(chunk) => {
                total = total.saturating_add(chunk.len());
                chunks.push(chunk);
                if total > limit {
                    let read = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
                    return Buffered::Partial(Body::from_stream(read.chain(data)));
                }
            }
            Err(e) => {
                debug!(error = %e, "could not read request body while looking for a token");
                let read = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err::<Bytes, _>(e)));
                return Buffered::Partial(Body::from_stream(stream::iter(read)));
            }
        }
    }

    let mut bytes = Vec::with_capacity(total);
    for chunk in &chunks {
        bytes.extend_from_slice(chunk);
    }
    Buffered::Complete(Bytes::from(bytes))
}

fn content_length(req: &Request) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(req: &Request) -> Option<BodyKind> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()?
        .split(';')
        .next()?
        .trim()
        .to_ascii_lowercase();

    if content_type == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else if content_type == "application/json"
        || (content_type.starts_with("application/") && content_type.ends_with("+json"))
    {
        Some(BodyKind::Json)
    } else {
        None
    }
}

fn token_from_query(query: &str) -> Option<String> {
    token_from_pairs(query.as_bytes())
}

fn token_from_form(body: &[u8]) -> Option<String> {
    token_from_pairs(body)
}

// A repeated `token` key yields the values joined by commas, which never
// verifies. A single empty value counts as absent.
fn token_from_pairs(input: &[u8]) -> Option<String> {
    let values: Vec<String> = url::form_urlencoded::parse(input)
        .filter(|(key, _)| key == TOKEN_FIELD)
        .map(|(_, value)| value.into_owned())
        .collect();

    match values.len() {
        0 => None,
        1 => values.into_iter().next().filter(|value| !value.is_empty()),
        _ => Some(values.join(",")),
    }
}

fn token_from_json(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get(TOKEN_FIELD)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        // Any other truthy value counts as a token and will fail verification.
        other => Some(other.to_string()),
    }
}

// ============= Request Context =============

/// Decoded claims of the verified token, stored in request extensions.
///
/// Also usable as an extractor in handlers behind [`required`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthData(pub Claims);

impl AuthData {
    /// Raw claim by name.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    /// Claim as a string slice.
    pub fn get_str(&self, claim: &str) -> Option<&str> {
        self.0.get(claim).and_then(Value::as_str)
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.0.get("iat").and_then(Value::as_i64)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(Value::as_i64)
    }

    /// Deserializes the claims into a caller-defined type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    pub fn into_inner(self) -> Claims {
        self.0
    }
}

impl<S> FromRequestParts<S> for AuthData
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthData>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Verification error for the presented token, stored in request extensions
/// before the `failedAuth` handler runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthFailure(pub TokenError);

impl AuthFailure {
    /// Looks up the failure recorded on `req`, if any.
    pub fn from_request(req: &Request) -> Option<&TokenError> {
        req.extensions().get::<AuthFailure>().map(|failure| &failure.0)
    }
}
