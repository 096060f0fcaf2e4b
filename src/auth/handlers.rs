//! Fallback handlers run when a request does not authenticate.
//!
//! A handler receives the request and the rest of the middleware chain. It
//! decides whether the request ends here (return a response) or continues
//! (call `next.run(req)`). The built-in handlers answer with a small JSON
//! error body and never continue.

use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::future::Future;
use tracing::debug;

/// Error code returned by [`RequireToken`].
pub const TOKEN_REQUIRED: &str = "token_required";
/// Error code returned by [`FailedAuth`].
pub const TOKEN_INVALID: &str = "token_invalid";

/// Replaceable behaviour for a request that did not authenticate.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// Produces the response for `req`, optionally by running `next`.
    async fn handle(&self, req: Request, next: Next) -> Response;
}

/// Default `requireToken` handler: `{"error": "token_required"}` with status 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireToken;

#[async_trait]
impl FallbackHandler for RequireToken {
    async fn handle(&self, req: Request, _next: Next) -> Response {
        debug!(path = %req.uri().path(), "request rejected: token required");
        Json(json!({ "error": TOKEN_REQUIRED })).into_response()
    }
}

/// Default `failedAuth` handler: `{"error": "token_invalid"}` with status 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailedAuth;

#[async_trait]
impl FallbackHandler for FailedAuth {
    async fn handle(&self, req: Request, _next: Next) -> Response {
        debug!(path = %req.uri().path(), "request rejected: token invalid");
        Json(json!({ "error": TOKEN_INVALID })).into_response()
    }
}

/// Adapter turning an async closure into a [`FallbackHandler`].
///
/// ```ignore
/// auth.on_missing_token(fallback_fn(|_req, _next| async {
///     (StatusCode::UNAUTHORIZED, "login first").into_response()
/// }));
/// ```
pub struct FallbackFn<F> {
    f: F,
}

/// Wraps `f` so it can be installed as a fallback handler.
pub fn fallback_fn<F, Fut>(f: F) -> FallbackFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FallbackFn { f }
}

#[async_trait]
impl<F, Fut> FallbackHandler for FallbackFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, req: Request, next: Next) -> Response {
        (self.f)(req, next).await
    }
}

impl<F> fmt::Debug for FallbackFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware::from_fn,
        routing::get,
        Router,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router(handler: Arc<dyn FallbackHandler>) -> Router {
        Router::new()
            .route("/", get(|| async { "reached" }))
            .layer(from_fn(move |req: Request, next: Next| {
                let handler = Arc::clone(&handler);
                async move { handler.handle(req, next).await }
            }))
    }

    async fn call(handler: Arc<dyn FallbackHandler>) -> (StatusCode, Vec<u8>) {
        let response = router(handler)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_require_token_response() {
        let (status, body) = call(Arc::new(RequireToken)).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": "token_required" }));
    }

    #[tokio::test]
    async fn test_failed_auth_response() {
        let (status, body) = call(Arc::new(FailedAuth)).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": "token_invalid" }));
    }

    #[tokio::test]
    async fn test_fallback_fn_can_continue() {
        let handler = fallback_fn(|req: Request, next: Next| async move { next.run(req).await });
        let (status, body) = call(Arc::new(handler)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"reached");
    }

    #[tokio::test]
    async fn test_fallback_fn_can_short_circuit() {
        let handler = fallback_fn(|_req: Request, _next: Next| async {
            (StatusCode::FORBIDDEN, "no").into_response()
        });
        let (status, body) = call(Arc::new(handler)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, b"no");
    }
}
