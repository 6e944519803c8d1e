//! User registration endpoint.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use serde_json::{Map, Value};

use crate::board::User;

use super::error::ApiError;
use super::routes::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/:email", post(save_user))
}

/// POST /users/:email - Return the existing user or register a new one.
async fn save_user(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(profile) = body?;
    let outcome = state.users.upsert(&email, profile).await?;
    Ok(Json(outcome.user))
}
