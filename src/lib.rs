//! # Task Board Server
//!
//! Backend for a multi-user kanban board. Tasks belong to an owner and sit in
//! named categories with an explicit, drag-and-drop editable rank.
//!
//! This library provides:
//! - The rank-maintaining [`board::OrderedTaskStore`] and the
//!   [`board::UserDirectory`]
//! - Pluggable storage (`memory`, `file`, `sqlite`) behind
//!   [`board::BoardStorage`]
//! - The axum HTTP layer in [`api`]
//!
//! ## Modules
//! - `board`: task/user model, ordering operations, storage backends
//! - `api`: routes, handlers and JSON error mapping
//! - `config`: environment-driven configuration

pub mod api;
pub mod board;
pub mod config;
pub mod util;

pub use board::{BoardError, OrderedTaskStore, Task, UserDirectory};
pub use config::Config;
