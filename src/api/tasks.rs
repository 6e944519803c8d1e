//! Task board API endpoints.
//!
//! - `POST /tasks` - Create a task at the end of its category
//! - `GET /tasks/:email` - List an owner's tasks by rank
//! - `PUT /tasks/reorder-tasks` - Apply a batch of rank/category changes
//! - `PUT /tasks/:id` - Patch one task
//! - `DELETE /tasks/:id` - Delete one task

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::board::{Task, TaskDraft, TaskPatch};

use super::error::ApiError;
use super::routes::AppState;
use super::types::{MessageResponse, ReorderRequest, ReorderResponse};

/// Create task routes. `:key` is an owner email for GET and a task id otherwise.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_task))
        .route("/reorder-tasks", put(reorder_tasks))
        .route(
            "/:key",
            get(list_tasks).put(update_task).delete(delete_task),
        )
}

/// POST /tasks
async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TaskDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(draft) = body?;
    let task = state.tasks.create_task(draft).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /tasks/:email
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.tasks.list_for_owner(&email).await?;
    Ok(Json(tasks))
}

/// PUT /tasks/reorder-tasks
async fn reorder_tasks(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<ReorderResponse>, ApiError> {
    let Json(request) = body?;
    let result = state.tasks.reorder_batch(&request.tasks).await?;
    Ok(Json(result.into()))
}

/// PUT /tasks/:id
async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(patch) = body?;
    let task = state.tasks.move_task(&id, patch).await?;
    Ok(Json(task))
}

/// DELETE /tasks/:id
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.tasks.delete_task(&id).await?;
    Ok(Json(MessageResponse {
        message: "Task deleted successfully".to_string(),
    }))
}
