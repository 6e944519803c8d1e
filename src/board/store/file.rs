//! JSON file-based board storage.
//!
//! Keeps the working set in an [`InMemoryBoardStorage`] and rewrites the whole
//! snapshot (write to `.tmp`, then rename) after every successful mutation.
//! A mutation whose snapshot cannot be written is undone in memory before the
//! error is returned.

use super::{sanitize_filename, BoardStorage, InMemoryBoardStorage, StorageError};
use crate::board::{
    BulkWriteResult, NewTask, RankUpdate, Task, TaskFilter, TaskId, TaskPatch, User,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Serialize, Deserialize, Default)]
struct BoardSnapshot {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Clone)]
pub struct FileBoardStorage {
    path: PathBuf,
    inner: InMemoryBoardStorage,
    /// Held across a mutation and its snapshot write.
    persist_lock: Arc<Mutex<()>>,
}

impl FileBoardStorage {
    pub async fn new(base_dir: PathBuf, db_name: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_dir).await?;
        let path = base_dir.join(format!("{}.json", sanitize_filename(db_name)));
        let snapshot = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<BoardSnapshot>(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!("Failed to parse board store {}: {}", path.display(), e);
                    BoardSnapshot::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BoardSnapshot::default(),
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(
            "Loaded {} tasks and {} users from {}",
            snapshot.tasks.len(),
            snapshot.users.len(),
            path.display()
        );

        let tasks = snapshot.tasks.into_iter().map(|t| (t.id, t)).collect();
        let users = snapshot
            .users
            .into_iter()
            .map(|u| (u.email.clone(), u))
            .collect();

        Ok(Self {
            path,
            inner: InMemoryBoardStorage::from_parts(tasks, users),
            persist_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Caller holds `persist_lock`.
    async fn persist(&self) -> Result<(), StorageError> {
        let (tasks, users) = self.inner.snapshot().await;
        let mut snapshot = BoardSnapshot {
            tasks: tasks.into_values().collect(),
            users: users.into_values().collect(),
        };
        snapshot.tasks.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.users.sort_by(|a, b| a.email.cmp(&b.email));

        let data = serde_json::to_vec_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl BoardStorage for FileBoardStorage {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let task = self.inner.insert_task(task).await?;
        if let Err(e) = self.persist().await {
            self.inner.delete_task(task.id).await?;
            return Err(e);
        }
        Ok(task)
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        self.inner.find_task(id).await
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        self.inner.find_tasks(filter).await
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64, StorageError> {
        self.inner.count_tasks(filter).await
    }

    async fn update_task(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let Some(previous) = self.inner.find_task(id).await? else {
            return Ok(None);
        };
        let updated = self.inner.update_task(id, patch).await?;
        if let Err(e) = self.persist().await {
            self.inner.restore_task(previous).await;
            return Err(e);
        }
        Ok(updated)
    }

    async fn delete_task(&self, id: TaskId) -> Result<u64, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let Some(previous) = self.inner.find_task(id).await? else {
            return Ok(0);
        };
        let deleted = self.inner.delete_task(id).await?;
        if let Err(e) = self.persist().await {
            self.inner.restore_task(previous).await;
            return Err(e);
        }
        Ok(deleted)
    }

    async fn bulk_update_ranks(
        &self,
        updates: &[RankUpdate],
    ) -> Result<BulkWriteResult, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let mut previous = Vec::with_capacity(updates.len());
        for update in updates {
            if let Some(task) = self.inner.find_task(update.id).await? {
                previous.push(task);
            }
        }

        let result = self.inner.bulk_update_ranks(updates).await?;
        if result.modified > 0 {
            if let Err(e) = self.persist().await {
                for task in previous {
                    self.inner.restore_task(task).await;
                }
                return Err(e);
            }
        }
        Ok(result)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.inner.find_user(email).await
    }

    async fn insert_user(&self, user: User) -> Result<bool, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let email = user.email.clone();
        let inserted = self.inner.insert_user(user).await?;
        if inserted {
            if let Err(e) = self.persist().await {
                self.inner.remove_user(&email).await;
                return Err(e);
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::conformance;
    use super::*;
    use crate::board::TaskDraft;
    use serde_json::Map;

    async fn open(dir: &tempfile::TempDir) -> FileBoardStorage {
        FileBoardStorage::new(dir.path().to_path_buf(), "board")
            .await
            .expect("open file store")
    }

    #[tokio::test]
    async fn insert_find_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        conformance::insert_find_count(&open(&dir).await).await;
    }

    #[tokio::test]
    async fn update_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        conformance::update_and_delete(&open(&dir).await).await;
    }

    #[tokio::test]
    async fn bulk_rank_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        conformance::bulk_rank_updates(&open(&dir).await).await;
    }

    #[tokio::test]
    async fn users_insert_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        conformance::users_insert_once(&open(&dir).await).await;
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir).await;
        let new_task = NewTask::from_draft(TaskDraft::new("a@example.com", "todo").with_title("x"))
            .expect("valid");
        let task = store.insert_task(new_task).await.expect("insert");
        store
            .bulk_update_ranks(&[RankUpdate {
                id: task.id,
                order: 3,
                category: "done".to_string(),
            }])
            .await
            .expect("bulk");
        drop(store);

        let reopened = open(&dir).await;
        assert!(reopened.is_persistent());
        let loaded = reopened
            .find_task(task.id)
            .await
            .expect("find")
            .expect("present after reopen");
        assert_eq!(loaded.order, 3);
        assert_eq!(loaded.category, "done");
        assert_eq!(loaded.title.as_deref(), Some("x"));
        assert!(!dir.path().join("board.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("board.json"), b"{not json").expect("write");
        let store = open(&dir).await;
        assert_eq!(
            store
                .count_tasks(&TaskFilter::default())
                .await
                .expect("count"),
            0
        );
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir).await;
        let draft = || NewTask::from_draft(TaskDraft::new("a@example.com", "todo")).expect("valid");
        let task = store.insert_task(draft()).await.expect("insert");

        // A directory at the temp path makes every snapshot write fail.
        let blocker = dir.path().join("board.json.tmp");
        std::fs::create_dir(&blocker).expect("block snapshot");

        assert!(store.insert_task(draft()).await.is_err());
        assert_eq!(
            store
                .count_tasks(&TaskFilter::default())
                .await
                .expect("count"),
            1
        );
        assert!(store
            .update_task(task.id, &TaskPatch::category("done"))
            .await
            .is_err());
        assert!(store
            .bulk_update_ranks(&[RankUpdate {
                id: task.id,
                order: 4,
                category: "done".to_string(),
            }])
            .await
            .is_err());
        assert!(store.delete_task(task.id).await.is_err());
        assert_eq!(store.find_task(task.id).await.expect("find"), Some(task));

        let user = User {
            email: "ada@example.com".to_string(),
            profile: Map::new(),
            timestamp: chrono::Utc::now(),
        };
        assert!(store.insert_user(user).await.is_err());
        assert_eq!(store.find_user("ada@example.com").await.expect("find"), None);

        std::fs::remove_dir(&blocker).expect("unblock snapshot");
        store.insert_task(draft()).await.expect("insert");
        drop(store);

        let reopened = open(&dir).await;
        assert_eq!(
            reopened
                .count_tasks(&TaskFilter::default())
                .await
                .expect("count"),
            2
        );
    }
}
