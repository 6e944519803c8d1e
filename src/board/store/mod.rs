//! Board storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `file`: JSON snapshot file, rewritten atomically on every change
//! - `sqlite`: SQLite database (default)

mod file;
mod memory;
mod sqlite;

pub use file::FileBoardStorage;
pub use memory::InMemoryBoardStorage;
pub use sqlite::SqliteBoardStorage;

use super::{BulkWriteResult, NewTask, RankUpdate, Task, TaskFilter, TaskId, TaskPatch, User};
use async_trait::async_trait;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Failure inside a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Rank {0} does not fit the storage column")]
    RankOutOfRange(u64),
}

/// Sanitize a string for use as a filename.
pub fn sanitize_filename(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "default".to_string()
    } else {
        out
    }
}

/// Sort tasks the way every `find_tasks` result is ordered: rank, then id.
pub(crate) fn sort_by_rank(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

/// Document storage consumed by the ordered task store and user directory.
///
/// Single-document writes are atomic in every backend. `bulk_update_ranks`
/// applies all updates under one lock or transaction where the backend
/// allows it.
#[async_trait]
pub trait BoardStorage: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Persist a new task, assigning its id.
    async fn insert_task(&self, task: NewTask) -> Result<Task, StorageError>;

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StorageError>;

    /// Matching tasks, ascending by `order` with ties broken by id.
    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError>;

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64, StorageError>;

    /// Apply a patch and return the updated document, or `None` if absent.
    async fn update_task(&self, id: TaskId, patch: &TaskPatch)
        -> Result<Option<Task>, StorageError>;

    /// Remove a task; returns the number of documents deleted.
    async fn delete_task(&self, id: TaskId) -> Result<u64, StorageError>;

    /// Set `order` and `category` on each listed task. Unknown ids are skipped.
    async fn bulk_update_ranks(
        &self,
        updates: &[RankUpdate],
    ) -> Result<BulkWriteResult, StorageError>;

    async fn find_user(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// Insert a user unless one with the same email exists.
    /// Returns whether the user was inserted.
    async fn insert_user(&self, user: User) -> Result<bool, StorageError>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    File,
    #[default]
    Sqlite,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(format!("unknown store type '{}'", other)),
        }
    }
}

/// Create a board storage based on type and configuration.
pub async fn create_storage(
    store_type: StoreType,
    base_dir: PathBuf,
    db_name: &str,
) -> Result<Arc<dyn BoardStorage>, StorageError> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryBoardStorage::new())),
        StoreType::File => {
            let store = FileBoardStorage::new(base_dir, db_name).await?;
            Ok(Arc::new(store))
        }
        StoreType::Sqlite => {
            let store = SqliteBoardStorage::new(base_dir, db_name).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every backend must share.

    use super::*;
    use crate::board::TaskDraft;
    use chrono::Utc;
    use serde_json::{json, Map};

    fn draft(owner: &str, category: &str, order: u64) -> NewTask {
        let mut task = NewTask::from_draft(TaskDraft::new(owner, category)).expect("valid draft");
        task.order = order;
        task
    }

    pub async fn insert_find_count(storage: &dyn BoardStorage) {
        let a = storage
            .insert_task(draft("a@example.com", "todo", 1))
            .await
            .expect("insert");
        let b = storage
            .insert_task(draft("a@example.com", "todo", 0))
            .await
            .expect("insert");
        storage
            .insert_task(draft("a@example.com", "done", 0))
            .await
            .expect("insert");
        storage
            .insert_task(draft("b@example.com", "todo", 0))
            .await
            .expect("insert");

        assert_eq!(storage.find_task(a.id).await.expect("find"), Some(a.clone()));
        assert_eq!(
            storage.find_task(TaskId::generate()).await.expect("find"),
            None
        );

        let scope = TaskFilter::scope(&a.scope());
        assert_eq!(storage.count_tasks(&scope).await.expect("count"), 2);
        assert_eq!(
            storage
                .count_tasks(&TaskFilter::owner("a@example.com"))
                .await
                .expect("count"),
            3
        );
        assert_eq!(
            storage
                .count_tasks(&TaskFilter::default())
                .await
                .expect("count"),
            4
        );

        let listed = storage.find_tasks(&scope).await.expect("find_tasks");
        let ids: Vec<TaskId> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    pub async fn update_and_delete(storage: &dyn BoardStorage) {
        let task = storage
            .insert_task(draft("a@example.com", "todo", 0))
            .await
            .expect("insert");

        let mut patch = TaskPatch::category("done");
        patch.extra.insert("priority".to_string(), json!("high"));
        let updated = storage
            .update_task(task.id, &patch)
            .await
            .expect("update")
            .expect("present");
        assert_eq!(updated.category, "done");
        assert_eq!(updated.order, 0);
        assert_eq!(updated.extra.get("priority"), Some(&json!("high")));
        assert_eq!(
            storage.find_task(task.id).await.expect("find"),
            Some(updated)
        );

        assert!(storage
            .update_task(TaskId::generate(), &patch)
            .await
            .expect("update")
            .is_none());

        assert_eq!(storage.delete_task(task.id).await.expect("delete"), 1);
        assert_eq!(storage.delete_task(task.id).await.expect("delete"), 0);
        assert_eq!(storage.find_task(task.id).await.expect("find"), None);
    }

    pub async fn bulk_rank_updates(storage: &dyn BoardStorage) {
        let first = storage
            .insert_task(draft("a@example.com", "todo", 0))
            .await
            .expect("insert");
        let second = storage
            .insert_task(draft("a@example.com", "todo", 1))
            .await
            .expect("insert");

        let updates = vec![
            RankUpdate {
                id: first.id,
                order: 0,
                category: "todo".to_string(),
            },
            RankUpdate {
                id: second.id,
                order: 0,
                category: "done".to_string(),
            },
            RankUpdate {
                id: TaskId::generate(),
                order: 5,
                category: "todo".to_string(),
            },
        ];
        let result = storage.bulk_update_ranks(&updates).await.expect("bulk");
        assert_eq!(
            result,
            BulkWriteResult {
                matched: 2,
                modified: 1
            }
        );

        let moved = storage
            .find_task(second.id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!((moved.order, moved.category.as_str()), (0, "done"));
        assert_eq!(moved.timestamp, second.timestamp);
    }

    pub async fn users_insert_once(storage: &dyn BoardStorage) {
        let mut profile = Map::new();
        profile.insert("name".to_string(), json!("Ada"));
        let user = User {
            email: "ada@example.com".to_string(),
            profile,
            timestamp: Utc::now(),
        };
        assert!(storage.insert_user(user.clone()).await.expect("insert"));

        let again = User {
            timestamp: Utc::now(),
            profile: Map::new(),
            ..user.clone()
        };
        assert!(!storage.insert_user(again).await.expect("insert"));

        assert_eq!(
            storage.find_user("ada@example.com").await.expect("find"),
            Some(user)
        );
        assert_eq!(
            storage.find_user("nobody@example.com").await.expect("find"),
            None
        );
    }
}
