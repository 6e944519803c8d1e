//! In-memory board storage (non-persistent).

use super::{sort_by_rank, BoardStorage, StorageError};
use crate::board::{
    BulkWriteResult, NewTask, RankUpdate, Task, TaskFilter, TaskId, TaskPatch, User,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryBoardStorage {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryBoardStorage {
    pub fn new() -> Self {
        Self::from_parts(HashMap::new(), HashMap::new())
    }

    pub(super) fn from_parts(tasks: HashMap<TaskId, Task>, users: HashMap<String, User>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks)),
            users: Arc::new(RwLock::new(users)),
        }
    }

    pub(super) async fn snapshot(&self) -> (HashMap<TaskId, Task>, HashMap<String, User>) {
        (
            self.tasks.read().await.clone(),
            self.users.read().await.clone(),
        )
    }

    /// Put a task back exactly as given, replacing any current version.
    pub(super) async fn restore_task(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }

    pub(super) async fn remove_user(&self, email: &str) {
        self.users.write().await.remove(email);
    }
}

impl Default for InMemoryBoardStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardStorage for InMemoryBoardStorage {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StorageError> {
        let mut tasks = self.tasks.write().await;
        let mut id = TaskId::generate();
        while tasks.contains_key(&id) {
            id = TaskId::generate();
        }
        let task = task.into_task(id);
        tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect();
        sort_by_rank(&mut tasks);
        Ok(tasks)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64, StorageError> {
        let count = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| filter.matches(task))
            .count();
        Ok(count as u64)
    }

    async fn update_task(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StorageError> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks.get_mut(&id).map(|task| {
            patch.apply(task);
            task.clone()
        }))
    }

    async fn delete_task(&self, id: TaskId) -> Result<u64, StorageError> {
        Ok(u64::from(self.tasks.write().await.remove(&id).is_some()))
    }

    async fn bulk_update_ranks(
        &self,
        updates: &[RankUpdate],
    ) -> Result<BulkWriteResult, StorageError> {
        let mut tasks = self.tasks.write().await;
        let mut result = BulkWriteResult::default();
        for update in updates {
            if let Some(task) = tasks.get_mut(&update.id) {
                result.matched += 1;
                if update.apply(task) {
                    result.modified += 1;
                }
            }
        }
        Ok(result)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, StorageError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<bool, StorageError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Ok(false);
        }
        users.insert(user.email.clone(), user);
        Ok(true)
    }
}
