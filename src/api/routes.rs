use crate::auth::required;
use crate::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        // Public routes (no auth required)
        .route("/", get(welcome))
        .route("/signup", post(crate::api::handlers::auth::signup))
        .route("/login", post(crate::api::handlers::auth::login));

    let protected_routes = Router::new()
        // Token read from the query string or the request body
        .route(
            "/users",
            get(crate::api::handlers::users::list_users)
                .post(crate::api::handlers::users::list_users),
        )
        .layer(middleware::from_fn_with_state(state.auth.clone(), required));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the API!" }))
}
