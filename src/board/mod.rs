//! Task board domain: tasks, users and the rank-maintaining stores.
//!
//! # Invariants
//! - `order` values are meaningful only within one scope, the pair
//!   (owner email, category).
//! - Within a scope, ranks form `0..N-1` after every completed operation
//!   issued by cooperating callers. Only [`OrderedTaskStore`] writes `order`.

mod id;
mod ordered;
pub mod store;
mod users;

pub use id::{InvalidTaskId, TaskId};
pub use ordered::{OrderedTaskStore, RankReport};
pub use store::{BoardStorage, StorageError};
pub use users::{UserDirectory, UserUpsert};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload keys the server owns; clients cannot set them on create.
const SERVER_OWNED_KEYS: &[&str] = &["_id", "order", "timestamp"];

/// The `userData` object embedded in every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub email: String,
    /// Display name, photo url and whatever else the client sends.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl Owner {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            profile: Map::new(),
        }
    }
}

/// A persisted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: TaskId,
    #[serde(rename = "userData")]
    pub owner: Owner,
    pub category: String,
    pub order: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque client fields, preserved untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn scope(&self) -> RankScope {
        RankScope::new(&self.owner.email, &self.category)
    }
}

/// Client payload for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDraft {
    #[serde(rename = "userData")]
    pub owner: Option<Owner>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskDraft {
    pub fn new(owner_email: &str, category: &str) -> Self {
        Self {
            owner: Some(Owner::new(owner_email)),
            category: Some(category.to_string()),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// A validated task that has been ranked but not yet assigned an id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner: Owner,
    pub category: String,
    pub order: u64,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub extra: Map<String, Value>,
}

impl NewTask {
    /// Validate a draft. The rank is filled in later by the ordered store.
    pub fn from_draft(draft: TaskDraft) -> Result<Self, BoardError> {
        let owner = draft
            .owner
            .filter(|owner| !owner.email.trim().is_empty())
            .ok_or_else(|| BoardError::Validation("userData.email is required".to_string()))?;
        let category = draft
            .category
            .filter(|category| !category.trim().is_empty())
            .ok_or_else(|| BoardError::Validation("category is required".to_string()))?;

        let mut extra = draft.extra;
        for key in SERVER_OWNED_KEYS {
            extra.remove(*key);
        }

        Ok(Self {
            owner,
            category,
            order: 0,
            timestamp: Utc::now(),
            title: draft.title,
            description: draft.description,
            extra,
        })
    }

    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            id,
            owner: self.owner,
            category: self.category,
            order: self.order,
            timestamp: self.timestamp,
            title: self.title,
            description: self.description,
            extra: self.extra,
        }
    }
}

/// Partial update applied by `MoveTask`.
///
/// Absent fields leave the task untouched. `_id` is stripped; the owner and
/// the creation timestamp cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskPatch {
    pub fn category(category: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            ..Self::default()
        }
    }

    pub fn rank(order: u64, category: &str) -> Self {
        Self {
            order: Some(order),
            ..Self::category(category)
        }
    }

    /// Drop `_id` and reject immutable or blank fields.
    pub fn sanitized(mut self) -> Result<Self, BoardError> {
        self.extra.remove("_id");
        for key in ["userData", "timestamp"] {
            if self.extra.contains_key(key) {
                return Err(BoardError::Validation(format!("{} cannot be changed", key)));
            }
        }
        if matches!(&self.category, Some(category) if category.trim().is_empty()) {
            return Err(BoardError::Validation("category cannot be empty".to_string()));
        }
        Ok(self)
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(category) = &self.category {
            task.category = category.clone();
        }
        if let Some(order) = self.order {
            task.order = order;
        }
        if let Some(title) = &self.title {
            task.title = Some(title.clone());
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        for (key, value) in &self.extra {
            task.extra.insert(key.clone(), value.clone());
        }
    }
}

/// One entry of a batch reorder as received from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReorderEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub order: u64,
    pub category: String,
}

impl ReorderEntry {
    pub fn new(id: TaskId, order: u64, category: &str) -> Self {
        Self {
            id: id.to_string(),
            order,
            category: category.to_string(),
        }
    }
}

/// A validated rank assignment for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankUpdate {
    pub id: TaskId,
    pub order: u64,
    pub category: String,
}

impl RankUpdate {
    /// Set rank and category; returns whether anything changed.
    pub fn apply(&self, task: &mut Task) -> bool {
        if task.order == self.order && task.category == self.category {
            return false;
        }
        task.order = self.order;
        task.category = self.category.clone();
        true
    }
}

/// Outcome of a bulk rank write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteResult {
    pub matched: u64,
    pub modified: u64,
}

/// The (owner, category) pair ranks are relative to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankScope {
    pub owner_email: String,
    pub category: String,
}

impl RankScope {
    pub fn new(owner_email: &str, category: &str) -> Self {
        Self {
            owner_email: owner_email.to_string(),
            category: category.to_string(),
        }
    }
}

/// Task query. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub owner_email: Option<String>,
    pub category: Option<String>,
}

impl TaskFilter {
    pub fn owner(email: &str) -> Self {
        Self {
            owner_email: Some(email.to_string()),
            category: None,
        }
    }

    pub fn scope(scope: &RankScope) -> Self {
        Self {
            owner_email: Some(scope.owner_email.clone()),
            category: Some(scope.category.clone()),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.owner_email
            .as_deref()
            .map_or(true, |email| task.owner.email == email)
            && self
                .category
                .as_deref()
                .map_or(true, |category| task.category == category)
    }
}

/// A board user, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
    /// Set on first insert only.
    pub timestamp: DateTime<Utc>,
}

/// Errors surfaced by board operations.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<InvalidTaskId> for BoardError {
    fn from(err: InvalidTaskId) -> Self {
        BoardError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_requires_category_and_owner() {
        let mut draft = TaskDraft::new("a@example.com", "todo");
        draft.category = None;
        assert!(matches!(
            NewTask::from_draft(draft),
            Err(BoardError::Validation(_))
        ));

        let draft = TaskDraft::new("a@example.com", "   ");
        assert!(matches!(
            NewTask::from_draft(draft),
            Err(BoardError::Validation(_))
        ));

        let mut draft = TaskDraft::new("a@example.com", "todo");
        draft.owner = None;
        assert!(matches!(
            NewTask::from_draft(draft),
            Err(BoardError::Validation(_))
        ));
    }

    #[test]
    fn draft_drops_server_owned_keys() {
        let draft: TaskDraft = serde_json::from_value(json!({
            "_id": "65d4a1f2c3b4a5968778695a",
            "title": "Write docs",
            "category": "todo",
            "order": 42,
            "timestamp": "yesterday",
            "priority": "high",
            "userData": { "email": "a@example.com", "name": "A" }
        }))
        .expect("draft");

        let task = NewTask::from_draft(draft)
            .expect("valid draft")
            .into_task(TaskId::generate());
        assert_eq!(task.order, 0);
        assert_eq!(task.title.as_deref(), Some("Write docs"));
        assert_eq!(task.owner.profile.get("name"), Some(&json!("A")));
        assert_eq!(task.extra.len(), 1);
        assert_eq!(task.extra.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn task_serializes_with_wire_names() {
        let task = NewTask::from_draft(TaskDraft::new("a@example.com", "todo"))
            .expect("valid")
            .into_task(TaskId::generate());
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["_id"], json!(task.id.to_string()));
        assert_eq!(value["userData"]["email"], json!("a@example.com"));
        assert_eq!(value["order"], json!(0));
        assert!(value.get("title").is_none());

        let back: Task = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, task);
    }

    #[test]
    fn patch_strips_id_and_rejects_immutable_fields() {
        let patch: TaskPatch = serde_json::from_value(json!({
            "_id": "65d4a1f2c3b4a5968778695a",
            "category": "done"
        }))
        .expect("patch");
        let patch = patch.sanitized().expect("sanitized");
        assert!(patch.extra.is_empty());
        assert_eq!(patch.category.as_deref(), Some("done"));

        let patch: TaskPatch =
            serde_json::from_value(json!({ "userData": { "email": "b@example.com" } }))
                .expect("patch");
        assert!(matches!(patch.sanitized(), Err(BoardError::Validation(_))));

        assert!(matches!(
            TaskPatch::category(" ").sanitized(),
            Err(BoardError::Validation(_))
        ));
    }

    #[test]
    fn patch_touches_only_supplied_fields() {
        let mut task = NewTask::from_draft(TaskDraft::new("a@example.com", "todo").with_title("t"))
            .expect("valid")
            .into_task(TaskId::generate());
        task.order = 3;
        let before = task.clone();

        TaskPatch::category("doing").apply(&mut task);
        assert_eq!(task.category, "doing");
        assert_eq!(task.order, before.order);
        assert_eq!(task.title, before.title);
        assert_eq!(task.timestamp, before.timestamp);
    }

    #[test]
    fn rank_update_reports_changes() {
        let mut task = NewTask::from_draft(TaskDraft::new("a@example.com", "todo"))
            .expect("valid")
            .into_task(TaskId::generate());
        let same = RankUpdate {
            id: task.id,
            order: 0,
            category: "todo".to_string(),
        };
        assert!(!same.apply(&mut task));

        let moved = RankUpdate {
            id: task.id,
            order: 2,
            category: "done".to_string(),
        };
        assert!(moved.apply(&mut task));
        assert_eq!((task.order, task.category.as_str()), (2, "done"));
    }

    #[test]
    fn filter_matches_by_owner_and_category() {
        let task = NewTask::from_draft(TaskDraft::new("a@example.com", "todo"))
            .expect("valid")
            .into_task(TaskId::generate());
        assert!(TaskFilter::default().matches(&task));
        assert!(TaskFilter::owner("a@example.com").matches(&task));
        assert!(!TaskFilter::owner("b@example.com").matches(&task));
        assert!(TaskFilter::scope(&task.scope()).matches(&task));
        assert!(!TaskFilter::scope(&RankScope::new("a@example.com", "done")).matches(&task));
    }
}
