//! API request handlers.

/// Signup and login handlers.
pub mod auth;
/// Token-protected user listing.
pub mod users;

use crate::types::AppError;
use axum::{
    extract::{FromRequest, Request},
    http::header,
    Form, Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Request body accepted either as JSON object or as a urlencoded form.
#[derive(Debug, Clone)]
pub struct Payload(pub Map<String, Value>);

impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            Ok(Payload(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ))
        } else {
            let Json(fields) = Json::<Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            Ok(Payload(fields))
        }
    }
}
