//! HTTP API for the task board.
//!
//! ## Endpoints
//!
//! - `GET /` - Banner
//! - `GET /api/health` - Health check
//! - `POST /users/{email}` - Register a user on first sight
//! - `POST /tasks` - Create a task at the end of its category
//! - `GET /tasks/{email}` - List an owner's tasks ordered by rank
//! - `PUT /tasks/reorder-tasks` - Apply a batch of rank/category changes
//! - `PUT /tasks/{id}` - Patch one task
//! - `DELETE /tasks/{id}` - Delete one task

mod error;
mod routes;
mod tasks;
pub mod types;
mod users;

pub use error::ApiError;
pub use routes::{router, serve, AppState};
pub use types::*;
