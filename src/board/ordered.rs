//! Rank-maintaining task operations.
//!
//! [`OrderedTaskStore`] is the only writer of `order`. It keeps no rank state
//! of its own: the append position is derived from a count of the scope at
//! creation time, and every other operation reads or writes storage directly.
//!
//! Density of a scope is upheld by cooperating callers. A delete leaves a gap
//! until the client sends a compacting reorder, unless `compact_on_delete` is
//! enabled. `verify_scope` and `compact_scope` are available to check and
//! repair a scope explicitly.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::store::BoardStorage;
use super::{
    BoardError, BulkWriteResult, NewTask, RankScope, RankUpdate, ReorderEntry, Task, TaskDraft,
    TaskFilter, TaskId, TaskPatch,
};

/// Rank density of one scope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RankReport {
    /// Observed ranks, ascending.
    pub orders: Vec<u64>,
    /// Ranks in `0..N` held by no task.
    pub missing: Vec<u64>,
    /// Ranks held by more than one task.
    pub duplicates: Vec<u64>,
}

impl RankReport {
    pub fn from_orders(mut orders: Vec<u64>) -> Self {
        orders.sort_unstable();

        let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
        for order in &orders {
            *counts.entry(*order).or_default() += 1;
        }
        let len = orders.len() as u64;
        let missing = (0..len).filter(|rank| !counts.contains_key(rank)).collect();
        let duplicates = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(rank, _)| *rank)
            .collect();

        Self {
            orders,
            missing,
            duplicates,
        }
    }

    /// True iff the ranks are exactly `0..N-1`.
    pub fn is_dense(&self) -> bool {
        self.missing.is_empty() && self.duplicates.is_empty()
    }
}

struct ScopeSlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

type LockTable = HashMap<RankScope, ScopeSlot>;

/// Claim on one scope's rank lock. The table entry goes away with the last
/// claim, including when the owning future is dropped mid-wait.
struct ScopeLease {
    table: Arc<StdMutex<LockTable>>,
    scope: RankScope,
    lock: Arc<Mutex<()>>,
}

impl ScopeLease {
    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for ScopeLease {
    fn drop(&mut self) {
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = locks.get_mut(&self.scope) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                locks.remove(&self.scope);
            }
        }
    }
}

#[derive(Clone)]
pub struct OrderedTaskStore {
    storage: Arc<dyn BoardStorage>,
    /// Serializes appends and compactions per scope within this process.
    scope_locks: Arc<StdMutex<LockTable>>,
    compact_on_delete: bool,
}

impl OrderedTaskStore {
    pub fn new(storage: Arc<dyn BoardStorage>) -> Self {
        Self {
            storage,
            scope_locks: Arc::new(StdMutex::new(HashMap::new())),
            compact_on_delete: false,
        }
    }

    /// Re-rank the vacated scope after every delete.
    pub fn with_compact_on_delete(mut self, enabled: bool) -> Self {
        self.compact_on_delete = enabled;
        self
    }

    pub fn storage(&self) -> &Arc<dyn BoardStorage> {
        &self.storage
    }

    /// Append a task to the end of its (owner, category) scope.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, BoardError> {
        let new_task = NewTask::from_draft(draft)?;
        let scope = RankScope::new(&new_task.owner.email, &new_task.category);

        let task = {
            let lease = self.lease(&scope);
            let _guard = lease.lock().await;
            self.append(new_task, &scope).await?
        };
        debug!(
            "Created task {} at rank {} in {}/{}",
            task.id, task.order, task.owner.email, task.category
        );
        Ok(task)
    }

    async fn append(&self, mut new_task: NewTask, scope: &RankScope) -> Result<Task, BoardError> {
        new_task.order = self.storage.count_tasks(&TaskFilter::scope(scope)).await?;
        Ok(self.storage.insert_task(new_task).await?)
    }

    /// All tasks of one owner, ascending by rank. Does not repair gaps.
    pub async fn list_for_owner(&self, owner_email: &str) -> Result<Vec<Task>, BoardError> {
        let tasks = self
            .storage
            .find_tasks(&TaskFilter::owner(owner_email))
            .await?;
        debug!("Listed {} tasks for {}", tasks.len(), owner_email);
        Ok(tasks)
    }

    /// Apply a client-computed rank assignment in one bulk write.
    ///
    /// The batch is validated in full before anything is written. The given
    /// ranks are trusted; callers compare `matched` with the batch length to
    /// detect ids that no longer exist.
    pub async fn reorder_batch(
        &self,
        entries: &[ReorderEntry],
    ) -> Result<BulkWriteResult, BoardError> {
        if entries.is_empty() {
            return Err(BoardError::Validation("Invalid tasks array".to_string()));
        }
        let updates = entries
            .iter()
            .map(|entry| {
                let id = TaskId::parse(&entry.id)?;
                if entry.category.trim().is_empty() {
                    return Err(BoardError::Validation(format!(
                        "Task {} has an empty category",
                        entry.id
                    )));
                }
                Ok(RankUpdate {
                    id,
                    order: entry.order,
                    category: entry.category.clone(),
                })
            })
            .collect::<Result<Vec<_>, BoardError>>()?;

        let result = self.storage.bulk_update_ranks(&updates).await?;
        if result.matched < updates.len() as u64 {
            warn!(
                "Reorder matched {} of {} tasks",
                result.matched,
                updates.len()
            );
        }
        info!(
            "Reordered {} tasks ({} matched, {} modified)",
            updates.len(),
            result.matched,
            result.modified
        );
        Ok(result)
    }

    /// Patch a single task and return the updated document.
    pub async fn move_task(&self, id: &str, patch: TaskPatch) -> Result<Task, BoardError> {
        let id = TaskId::parse(id)?;
        let patch = patch.sanitized()?;
        let task = self
            .storage
            .update_task(id, &patch)
            .await?
            .ok_or_else(|| BoardError::NotFound("Task not found".to_string()))?;
        debug!(
            "Updated task {} (rank {} in {})",
            task.id, task.order, task.category
        );
        Ok(task)
    }

    /// Remove a task. Survivors keep their ranks unless compact-on-delete is on.
    ///
    /// With compact-on-delete the delete and the re-rank run under the scope
    /// lock. A failed re-rank is logged and the delete still succeeds.
    pub async fn delete_task(&self, id: &str) -> Result<(), BoardError> {
        let id = TaskId::parse(id)?;
        if !self.compact_on_delete {
            return self.remove(id).await;
        }

        let Some(task) = self.storage.find_task(id).await? else {
            return Err(BoardError::NotFound("Task not found".to_string()));
        };
        let scope = task.scope();
        let lease = self.lease(&scope);
        let _guard = lease.lock().await;

        self.remove(id).await?;
        if let Err(e) = self.compact_locked(&scope).await {
            warn!(
                "Deleted task {} but could not compact {}/{}: {}",
                id, scope.owner_email, scope.category, e
            );
        }
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), BoardError> {
        if self.storage.delete_task(id).await? == 0 {
            return Err(BoardError::NotFound("Task not found".to_string()));
        }
        debug!("Deleted task {}", id);
        Ok(())
    }

    /// Report gaps and duplicates in one scope.
    pub async fn verify_scope(&self, scope: &RankScope) -> Result<RankReport, BoardError> {
        let tasks = self.storage.find_tasks(&TaskFilter::scope(scope)).await?;
        Ok(RankReport::from_orders(
            tasks.iter().map(|task| task.order).collect(),
        ))
    }

    /// Rewrite a scope to `0..N-1`, keeping the current (rank, id) sequence.
    pub async fn compact_scope(&self, scope: &RankScope) -> Result<BulkWriteResult, BoardError> {
        let lease = self.lease(scope);
        let _guard = lease.lock().await;
        self.compact_locked(scope).await
    }

    /// Caller holds the scope lock.
    async fn compact_locked(&self, scope: &RankScope) -> Result<BulkWriteResult, BoardError> {
        let tasks = self.storage.find_tasks(&TaskFilter::scope(scope)).await?;
        let updates: Vec<RankUpdate> = tasks
            .iter()
            .enumerate()
            .filter(|(rank, task)| task.order != *rank as u64)
            .map(|(rank, task)| RankUpdate {
                id: task.id,
                order: rank as u64,
                category: task.category.clone(),
            })
            .collect();

        if updates.is_empty() {
            return Ok(BulkWriteResult::default());
        }
        let result = self.storage.bulk_update_ranks(&updates).await?;
        info!(
            "Compacted {}/{}: {} ranks rewritten",
            scope.owner_email, scope.category, result.modified
        );
        Ok(result)
    }

    fn lease(&self, scope: &RankScope) -> ScopeLease {
        let mut locks = self
            .scope_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = locks.entry(scope.clone()).or_insert_with(|| ScopeSlot {
            lock: Arc::new(Mutex::new(())),
            users: 0,
        });
        slot.users += 1;
        ScopeLease {
            table: Arc::clone(&self.scope_locks),
            scope: scope.clone(),
            lock: Arc::clone(&slot.lock),
        }
    }
}
