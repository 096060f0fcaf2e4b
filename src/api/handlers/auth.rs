use crate::{
    api::handlers::Payload,
    auth::TokenOptions,
    types::{AppError, Result},
    AppState,
};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

/// Register a new user
///
/// Stores the submitted fields as-is and echoes the stored record.
pub async fn signup(
    State(state): State<AppState>,
    Payload(record): Payload,
) -> Result<Json<Value>> {
    let username = record
        .get("username")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::InvalidInput("username is required".to_string()))?
        .to_string();

    if state.users.find_by_username(&username).await?.is_some() {
        return Err(AppError::InvalidInput("User already exists".to_string()));
    }

    let stored = state.users.insert(record).await?;
    info!(username = %username, "user registered");

    Ok(Json(json!({
        "message": format!("{username} has successfully registered."),
        "data": stored,
    })))
}

/// Login with username and password
///
/// On success the user record, without its password, becomes the token's claims.
pub async fn login(
    State(state): State<AppState>,
    Payload(credentials): Payload,
) -> Result<Json<Value>> {
    let username = credentials.get("username").and_then(Value::as_str);
    let password = credentials.get("password");

    let user = match username {
        Some(username) => state.users.find_by_username(username).await?,
        None => None,
    };

    let Some(mut user) = user.filter(|u| password.is_some() && u.get("password") == password)
    else {
        return Ok(Json(json!({
            "message": "Username and/or password is incorrect."
        })));
    };

    user.remove("password");
    let token = state
        .auth
        .generate_token(&user, TokenOptions::default())
        .await?;

    let profile_name = user
        .get("profileName")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Json(json!({
        "message": format!("Welcome {profile_name}"),
        "access_token": token,
    })))
}
