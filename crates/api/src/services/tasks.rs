//! Task tracking.
//!
//! Tasks belong to a store; callers reach them through stores they own.
//! Status only moves forward, and each change is saved conditionally on the
//! status that was read so concurrent updates cannot interleave.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use amts_core::{StoreId, TaskId, TaskPriority, TaskStatus, TaskType, UserId};

use super::{ServiceError, owned_store, store_ids_of};
use crate::db::{ProductRepository, StoreRepository, TaskRepository};
use crate::models::{NewTask, Task, TaskFilter, TaskSummary, TaskUpdate, clamp_limit};

/// Query parameters for a task listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    pub store_id: Option<StoreId>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Task CRUD and status transitions.
#[derive(Clone)]
pub struct TaskService {
    stores: Arc<dyn StoreRepository>,
    products: Arc<dyn ProductRepository>,
    tasks: Arc<dyn TaskRepository>,
}

impl TaskService {
    /// Create a task service.
    #[must_use]
    pub fn new(
        stores: Arc<dyn StoreRepository>,
        products: Arc<dyn ProductRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            stores,
            products,
            tasks,
        }
    }

    /// List the caller's tasks, most urgent first, then newest.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` or `ServiceError::NotFound` when
    /// filtering by a store the caller cannot reach.
    #[instrument(skip(self, query))]
    pub async fn list(&self, caller: UserId, query: TaskQuery) -> Result<Vec<Task>, ServiceError> {
        let store_ids = self.scope(caller, query.store_id).await?;
        if store_ids.is_empty() {
            return Ok(Vec::new());
        }

        let filter = TaskFilter {
            store_ids: Some(store_ids),
            status: query.status,
            priority: query.priority,
            task_type: query.task_type,
            limit: clamp_limit(query.limit, 50),
            offset: query.offset.unwrap_or(0).max(0),
        };
        Ok(self.tasks.list(&filter).await?)
    }

    /// Get one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`.
    pub async fn get(&self, id: TaskId, caller: UserId) -> Result<Task, ServiceError> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("task"))?;
        owned_store(self.stores.as_ref(), task.store_id, caller).await?;
        Ok(task)
    }

    /// Create a pending task.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an empty title or a product
    /// from another store, plus the store ownership errors.
    #[instrument(skip(self, task), fields(store_id = %task.store_id, task_type = %task.task_type))]
    pub async fn create(&self, caller: UserId, task: NewTask) -> Result<Task, ServiceError> {
        if task.title.trim().is_empty() {
            return Err(ServiceError::Validation("title must not be empty".to_string()));
        }
        owned_store(self.stores.as_ref(), task.store_id, caller).await?;

        if let Some(product_id) = task.product_id {
            let belongs = self
                .products
                .get(product_id)
                .await?
                .is_some_and(|p| p.store_id == task.store_id);
            if !belongs {
                return Err(ServiceError::Validation(
                    "product does not belong to this store".to_string(),
                ));
            }
        }

        let task = self.tasks.create(task).await?;
        tracing::info!(task_id = %task.id, "Task created");
        Ok(task)
    }

    /// Apply a partial update, including an optional status change.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidTransition` for a backward status move,
    /// `ServiceError::Conflict` if the status changed concurrently, and
    /// `ServiceError::NotFound` or `ServiceError::Forbidden`.
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: TaskId,
        caller: UserId,
        update: TaskUpdate,
    ) -> Result<Task, ServiceError> {
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ServiceError::Validation("title must not be empty".to_string()));
        }

        let mut task = self.get(id, caller).await?;
        let previous = task.status;
        update.apply(&mut task, Utc::now())?;
        self.tasks
            .save(&task, previous)
            .await
            .map_err(ServiceError::missing("task"))
    }

    /// Move a task to `in_progress`.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub async fn start(&self, id: TaskId, caller: UserId) -> Result<Task, ServiceError> {
        self.move_to(id, caller, TaskStatus::InProgress, None).await
    }

    /// Move a task to `completed`, optionally recording a result.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub async fn complete(
        &self,
        id: TaskId,
        caller: UserId,
        result: Option<serde_json::Value>,
    ) -> Result<Task, ServiceError> {
        self.move_to(id, caller, TaskStatus::Completed, result).await
    }

    /// Move a task to `failed`, recording the reason in `result.error`.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub async fn fail(
        &self,
        id: TaskId,
        caller: UserId,
        error: Option<String>,
    ) -> Result<Task, ServiceError> {
        let result = error.map(|e| serde_json::json!({ "error": e }));
        self.move_to(id, caller, TaskStatus::Failed, result).await
    }

    /// Delete one of the caller's tasks.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` or `ServiceError::Forbidden`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: TaskId, caller: UserId) -> Result<(), ServiceError> {
        self.get(id, caller).await?;
        if !self.tasks.delete(id).await? {
            return Err(ServiceError::NotFound("task"));
        }
        Ok(())
    }

    /// Task counts by status, priority and type across the caller's stores.
    ///
    /// # Errors
    ///
    /// Returns the store ownership errors when scoped to one store.
    pub async fn summary(
        &self,
        caller: UserId,
        store_id: Option<StoreId>,
    ) -> Result<TaskSummary, ServiceError> {
        let store_ids = self.scope(caller, store_id).await?;
        if store_ids.is_empty() {
            return Ok(TaskSummary::default());
        }
        Ok(self.tasks.summary(Some(&store_ids)).await?)
    }

    async fn move_to(
        &self,
        id: TaskId,
        caller: UserId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
    ) -> Result<Task, ServiceError> {
        let update = TaskUpdate {
            status: Some(status),
            result,
            ..TaskUpdate::default()
        };
        let task = self.update(id, caller, update).await?;
        tracing::info!(task_id = %task.id, status = %task.status, "Task status changed");
        Ok(task)
    }

    async fn scope(
        &self,
        caller: UserId,
        store_id: Option<StoreId>,
    ) -> Result<Vec<StoreId>, ServiceError> {
        match store_id {
            Some(store_id) => {
                owned_store(self.stores.as_ref(), store_id, caller).await?;
                Ok(vec![store_id])
            }
            None => store_ids_of(self.stores.as_ref(), caller).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::db::Repositories;
    use crate::models::{NewStore, Store, TaskError};

    struct Harness {
        tasks: TaskService,
        repos: Repositories,
        owner: UserId,
        store: Store,
    }

    async fn harness() -> Harness {
        let repos = Repositories::in_memory();
        let owner = UserId::generate();
        let store = repos
            .stores
            .insert_or_reconnect(NewStore {
                user_id: owner,
                name: "Green Leaf".to_string(),
                shop_domain: "green-leaf".parse().unwrap(),
                access_token: SecretString::from("shpat_test"),
                products_count: 0,
            })
            .await
            .unwrap();
        Harness {
            tasks: TaskService::new(
                repos.stores.clone(),
                repos.products.clone(),
                repos.tasks.clone(),
            ),
            repos,
            owner,
            store,
        }
    }

    fn new_task(store_id: StoreId, title: &str, priority: TaskPriority) -> NewTask {
        serde_json::from_value(serde_json::json!({
            "store_id": store_id,
            "task_type": "seo_optimization",
            "priority": priority,
            "title": title,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_stamps_once() {
        let h = harness().await;
        let task = h
            .tasks
            .create(h.owner, new_task(h.store.id, "Meta titles", TaskPriority::High))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let started = h.tasks.start(task.id, h.owner).await.unwrap();
        let started_at = started.started_at.unwrap();

        let again = h.tasks.start(task.id, h.owner).await.unwrap();
        assert_eq!(again.started_at, Some(started_at));

        let done = h
            .tasks
            .complete(task.id, h.owner, Some(serde_json::json!({"updated": 12})))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.started_at, Some(started_at));
        assert!(done.completed_at.is_some());
        assert_eq!(done.result.unwrap()["updated"], 12);
    }

    #[tokio::test]
    async fn test_completed_to_pending_rejected() {
        let h = harness().await;
        let task = h
            .tasks
            .create(h.owner, new_task(h.store.id, "Meta titles", TaskPriority::Low))
            .await
            .unwrap();
        h.tasks.complete(task.id, h.owner, None).await.unwrap();

        let err = h
            .tasks
            .update(
                task.id,
                h.owner,
                TaskUpdate {
                    status: Some(TaskStatus::Pending),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition(TaskError::InvalidTransition { .. })
        ));
        assert_eq!(
            h.tasks.get(task.id, h.owner).await.unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_fail_records_reason_without_completion_stamp() {
        let h = harness().await;
        let task = h
            .tasks
            .create(h.owner, new_task(h.store.id, "Resize images", TaskPriority::Medium))
            .await
            .unwrap();

        let failed = h
            .tasks
            .fail(task.id, h.owner, Some("CDN unavailable".to_string()))
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.completed_at.is_none());
        assert_eq!(failed.result.unwrap()["error"], "CDN unavailable");
    }

    #[tokio::test]
    async fn test_foreign_task_is_forbidden() {
        let h = harness().await;
        let task = h
            .tasks
            .create(h.owner, new_task(h.store.id, "Meta titles", TaskPriority::Low))
            .await
            .unwrap();

        let err = h.tasks.get(task.id, UserId::generate()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        let err = h
            .tasks
            .delete(task.id, UserId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[tokio::test]
    async fn test_product_must_belong_to_store() {
        let h = harness().await;
        let mut task = new_task(h.store.id, "Describe", TaskPriority::Low);
        task.product_id = Some(amts_core::ProductId::generate());

        let err = h.tasks.create(h.owner, task).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_and_summary_counts() {
        let h = harness().await;
        for (title, priority) in [
            ("low", TaskPriority::Low),
            ("urgent", TaskPriority::Urgent),
            ("medium", TaskPriority::Medium),
        ] {
            h.tasks
                .create(h.owner, new_task(h.store.id, title, priority))
                .await
                .unwrap();
        }

        let listed = h.tasks.list(h.owner, TaskQuery::default()).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["urgent", "medium", "low"]);

        let summary = h.tasks.summary(h.owner, None).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_status[&TaskStatus::Pending], 3);
        assert_eq!(summary.by_type[&TaskType::SeoOptimization], 3);

        let empty = h.tasks.summary(UserId::generate(), None).await.unwrap();
        assert_eq!(empty.total, 0);
        assert!(h.repos.tasks.summary(None).await.unwrap().total >= 3);
    }
}
