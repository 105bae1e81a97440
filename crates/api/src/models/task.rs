//! Work items tracked per store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use amts_core::{ProductId, StoreId, TaskId, TaskPriority, TaskStatus, TaskType};

/// Errors from task state changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Status changes only move forward.
    #[error("cannot move task from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

/// A task (domain type).
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub store_id: StoreId,
    pub product_id: Option<ProductId>,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub title: String,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Move to `next`, stamping `started_at` on the first entry into
    /// `in_progress` and `completed_at` on entry into `completed`.
    ///
    /// Stamps that are already set are kept.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::InvalidTransition` for a backward move.
    pub fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match next {
            TaskStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            TaskStatus::Completed => {
                self.completed_at.get_or_insert(now);
            }
            TaskStatus::Pending | TaskStatus::Failed => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Input for creating a task.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub store_id: StoreId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: TaskPriority,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

impl NewTask {
    /// Materialize a pending task with a fresh id and timestamps.
    #[must_use]
    pub fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: TaskId::generate(),
            store_id: self.store_id,
            product_id: self.product_id,
            task_type: self.task_type,
            priority: self.priority,
            status: TaskStatus::Pending,
            title: self.title,
            description: self.description,
            metadata: self.metadata,
            result: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub metadata: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
}

impl TaskUpdate {
    /// Apply the set fields to `task`, status last.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::InvalidTransition` if the status would move
    /// backward; `task` is left unchanged in that case.
    pub fn apply(self, task: &mut Task, now: DateTime<Utc>) -> Result<(), TaskError> {
        if let Some(status) = self.status {
            task.transition(status, now)?;
        }
        if let Some(v) = self.title {
            task.title = v;
        }
        if let Some(v) = self.description {
            task.description = Some(v);
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = self.metadata {
            task.metadata = v;
        }
        if let Some(v) = self.result {
            task.result = Some(v);
        }
        task.updated_at = now;
        Ok(())
    }
}

/// Filters for task listings.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    /// Restrict to these stores. `None` means every store.
    pub store_ids: Option<Vec<StoreId>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            store_ids: None,
            status: None,
            priority: None,
            task_type: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl TaskFilter {
    /// Whether `task` passes every set filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.store_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&task.store_id))
            && self.status.is_none_or(|s| task.status == s)
            && self.priority.is_none_or(|p| task.priority == p)
            && self.task_type.is_none_or(|t| task.task_type == t)
    }
}

/// Task counts by status, priority and type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub total: i64,
    pub by_status: BTreeMap<TaskStatus, i64>,
    pub by_priority: BTreeMap<TaskPriority, i64>,
    pub by_type: BTreeMap<TaskType, i64>,
}

impl TaskSummary {
    /// Count `n` tasks with the given attributes.
    pub fn add(&mut self, status: TaskStatus, priority: TaskPriority, task_type: TaskType, n: i64) {
        self.total += n;
        *self.by_status.entry(status).or_default() += n;
        *self.by_priority.entry(priority).or_default() += n;
        *self.by_type.entry(task_type).or_default() += n;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn task() -> Task {
        NewTask {
            store_id: StoreId::generate(),
            product_id: None,
            task_type: TaskType::ContentGeneration,
            priority: TaskPriority::High,
            title: "Write descriptions".to_string(),
            description: None,
            metadata: empty_object(),
        }
        .into_task(Utc::now())
    }

    #[test]
    fn test_start_stamps_started_at_once() {
        let mut t = task();
        let first = Utc::now();
        t.transition(TaskStatus::InProgress, first).unwrap();
        assert_eq!(t.started_at, Some(first));

        let later = first + Duration::minutes(5);
        t.transition(TaskStatus::InProgress, later).unwrap();
        assert_eq!(t.started_at, Some(first));
    }

    #[test]
    fn test_complete_stamps_completed_at_once() {
        let mut t = task();
        let done = Utc::now();
        t.transition(TaskStatus::Completed, done).unwrap();
        assert_eq!(t.completed_at, Some(done));
        assert_eq!(t.started_at, None);

        t.transition(TaskStatus::Completed, done + Duration::hours(1))
            .unwrap();
        assert_eq!(t.completed_at, Some(done));
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut t = task();
        t.transition(TaskStatus::Completed, Utc::now()).unwrap();

        let err = t.transition(TaskStatus::Pending, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Pending
            }
        );
        assert_eq!(t.status, TaskStatus::Completed);
    }

    #[test]
    fn test_failure_does_not_stamp_completion() {
        let mut t = task();
        t.transition(TaskStatus::InProgress, Utc::now()).unwrap();
        t.transition(TaskStatus::Failed, Utc::now()).unwrap();
        assert!(t.completed_at.is_none());
        assert!(t.started_at.is_some());
    }

    #[test]
    fn test_update_rejects_backward_status_without_side_effects() {
        let mut t = task();
        t.transition(TaskStatus::Failed, Utc::now()).unwrap();

        let update = TaskUpdate {
            title: Some("Retitled".to_string()),
            status: Some(TaskStatus::InProgress),
            ..TaskUpdate::default()
        };
        assert!(update.apply(&mut t, Utc::now()).is_err());
        assert_eq!(t.title, "Write descriptions");
    }

    #[test]
    fn test_summary_accumulates() {
        let mut summary = TaskSummary::default();
        summary.add(TaskStatus::Pending, TaskPriority::High, TaskType::Custom, 2);
        summary.add(TaskStatus::Completed, TaskPriority::High, TaskType::ProductSync, 1);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_priority[&TaskPriority::High], 3);
        assert_eq!(summary.by_status[&TaskStatus::Pending], 2);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["by_type"]["product_sync"], 1);
    }

    #[test]
    fn test_new_task_metadata_defaults_to_object() {
        let new: NewTask = serde_json::from_value(serde_json::json!({
            "store_id": StoreId::generate(),
            "task_type": "product_sync",
            "title": "Sync catalog"
        }))
        .unwrap();
        assert_eq!(new.metadata, serde_json::json!({}));
        assert_eq!(new.priority, TaskPriority::Medium);
    }
}
