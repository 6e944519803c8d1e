//! SQLite-based board storage.
//!
//! Each row keeps the full task document as JSON next to the columns used for
//! filtering and sorting. Both are written together on every change.

use super::{sanitize_filename, BoardStorage, StorageError};
use crate::board::{
    BulkWriteResult, NewTask, RankUpdate, Task, TaskFilter, TaskId, TaskPatch, User,
};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    owner_email TEXT NOT NULL,
    category TEXT NOT NULL,
    task_order INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    document TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_owner_order ON tasks(owner_email, task_order, id);
CREATE INDEX IF NOT EXISTS idx_tasks_scope ON tasks(owner_email, category);

CREATE TABLE IF NOT EXISTS users (
    email TEXT PRIMARY KEY NOT NULL,
    created_at TEXT NOT NULL,
    document TEXT NOT NULL
);
"#;

pub struct SqliteBoardStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBoardStorage {
    pub async fn new(base_dir: PathBuf, db_name: &str) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&base_dir).await?;
        let db_path = base_dir.join(format!("{}.db", sanitize_filename(db_name)));

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            tracing::debug!("Opened board database at {}", db_path.display());
            Ok::<_, StorageError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

fn column_order(order: u64) -> Result<i64, StorageError> {
    i64::try_from(order).map_err(|_| StorageError::RankOutOfRange(order))
}

/// Build a WHERE clause and its bound values for a task filter.
fn filter_clause(filter: &TaskFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(email) = &filter.owner_email {
        values.push(email.clone());
        clauses.push(format!("owner_email = ?{}", values.len()));
    }
    if let Some(category) = &filter.category {
        values.push(category.clone());
        clauses.push(format!("category = ?{}", values.len()));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn load_task(conn: &Connection, id: &str) -> Result<Option<Task>, StorageError> {
    let document: Option<String> = conn
        .query_row(
            "SELECT document FROM tasks WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match document {
        Some(document) => Ok(Some(serde_json::from_str(&document)?)),
        None => Ok(None),
    }
}

fn write_task(conn: &Connection, task: &Task) -> Result<(), StorageError> {
    let document = serde_json::to_string(task)?;
    conn.execute(
        "INSERT INTO tasks (id, owner_email, category, task_order, created_at, document)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             category = excluded.category,
             task_order = excluded.task_order,
             document = excluded.document",
        params![
            task.id.to_string(),
            task.owner.email,
            task.category,
            column_order(task.order)?,
            task.timestamp.to_rfc3339(),
            document,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl BoardStorage for SqliteBoardStorage {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, StorageError> {
        self.with_conn(move |conn| {
            let task = task.into_task(TaskId::generate());
            write_task(conn, &task)?;
            Ok(task)
        })
        .await
    }

    async fn find_task(&self, id: TaskId) -> Result<Option<Task>, StorageError> {
        self.with_conn(move |conn| load_task(conn, &id.to_string()))
            .await
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        let (clause, values) = filter_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT document FROM tasks{} ORDER BY task_order ASC, id ASC",
                clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let documents = stmt
                .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            documents
                .iter()
                .map(|document| serde_json::from_str(document).map_err(StorageError::from))
                .collect()
        })
        .await
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64, StorageError> {
        let (clause, values) = filter_clause(filter);
        self.with_conn(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM tasks{}", clause);
            let count: i64 =
                conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn update_task(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StorageError> {
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut task) = load_task(&tx, &id.to_string())? else {
                return Ok(None);
            };
            patch.apply(&mut task);
            write_task(&tx, &task)?;
            tx.commit()?;
            Ok(Some(task))
        })
        .await
    }

    async fn delete_task(&self, id: TaskId) -> Result<u64, StorageError> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn bulk_update_ranks(
        &self,
        updates: &[RankUpdate],
    ) -> Result<BulkWriteResult, StorageError> {
        let updates = updates.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut result = BulkWriteResult::default();
            for update in &updates {
                let Some(mut task) = load_task(&tx, &update.id.to_string())? else {
                    continue;
                };
                result.matched += 1;
                if update.apply(&mut task) {
                    write_task(&tx, &task)?;
                    result.modified += 1;
                }
            }
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>, StorageError> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM users WHERE email = ?1",
                    params![email],
                    |row| row.get(0),
                )
                .optional()?;
            match document {
                Some(document) => Ok(Some(serde_json::from_str(&document)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert_user(&self, user: User) -> Result<bool, StorageError> {
        self.with_conn(move |conn| {
            let document = serde_json::to_string(&user)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (email, created_at, document) VALUES (?1, ?2, ?3)",
                params![user.email, user.timestamp.to_rfc3339(), document],
            )?;
            Ok(inserted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::conformance;
    use super::*;
    use crate::board::TaskDraft;

    async fn open(dir: &tempfile::TempDir) -> SqliteBoardStorage {
        SqliteBoardStorage::new(dir.path().to_path_buf(), "board")
            .await
            .expect("open sqlite store")
    }

    #[test]
    fn filter_clause_numbers_placeholders() {
        let (clause, values) = filter_clause(&TaskFilter::default());
        assert_eq!(clause, "");
        assert!(values.is_empty());

        let (clause, values) = filter_clause(&TaskFilter {
            owner_email: Some("a@example.com".to_string()),
            category: Some("todo".to_string()),
        });
        assert_eq!(clause, " WHERE owner_email = ?1 AND category = ?2");
        assert_eq!(values, vec!["a@example.com", "todo"]);
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
    async fn rows_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let task = {
            let store = open(&dir).await;
            let new_task =
                NewTask::from_draft(TaskDraft::new("a@example.com", "todo")).expect("valid");
            store.insert_task(new_task).await.expect("insert")
        };

        let reopened = open(&dir).await;
        assert_eq!(
            reopened.find_task(task.id).await.expect("find"),
            Some(task)
        );
    }

    #[tokio::test]
    async fn oversized_rank_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open(&dir).await;
        let mut new_task =
            NewTask::from_draft(TaskDraft::new("a@example.com", "todo")).expect("valid");
        new_task.order = u64::MAX;
        assert!(matches!(
            store.insert_task(new_task).await,
            Err(StorageError::RankOutOfRange(u64::MAX))
        ));
    }
}
