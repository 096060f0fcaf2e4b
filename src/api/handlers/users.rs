use crate::{auth::AuthData, types::Result, AppState};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// List users; requires a valid token
///
/// Passwords are left out of the listing.
pub async fn list_users(
    State(state): State<AppState>,
    auth_data: AuthData,
) -> Result<Json<Value>> {
    let users: Vec<Value> = state
        .users
        .list()
        .await?
        .into_iter()
        .map(|mut user| {
            user.remove("password");
            Value::Object(user)
        })
        .collect();

    let profile_name = auth_data.get_str("profileName").unwrap_or_default();

    Ok(Json(json!({
        "message": format!("Welcome {profile_name}. Here is the list of users:"),
        "users": users,
        "authData": auth_data.0,
    })))
}
