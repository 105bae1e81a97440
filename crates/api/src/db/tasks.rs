//! Task repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use amts_core::{ProductId, StoreId, TaskId, TaskPriority, TaskStatus, TaskType};

use super::RepositoryError;
use crate::models::{NewTask, Task, TaskFilter, TaskSummary};

/// Storage for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new pending task.
    async fn create(&self, task: NewTask) -> Result<Task, RepositoryError>;

    /// Get a task by id.
    async fn get(&self, id: TaskId) -> Result<Option<Task>, RepositoryError>;

    /// Persist a task whose status was `previous` when it was read.
    ///
    /// Fails with `Conflict` if another writer changed the status in the
    /// meantime, and `NotFound` if the task is gone. Existing
    /// `started_at`/`completed_at` stamps are never overwritten.
    async fn save(&self, task: &Task, previous: TaskStatus) -> Result<Task, RepositoryError>;

    /// Remove a task. Returns `false` if it did not exist.
    async fn delete(&self, id: TaskId) -> Result<bool, RepositoryError>;

    /// List tasks matching `filter`, most urgent first, then newest.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError>;

    /// Count tasks by status, priority and type within the given stores.
    async fn summary(&self, store_ids: Option<&[StoreId]>) -> Result<TaskSummary, RepositoryError>;
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    store_id: Uuid,
    product_id: Option<Uuid>,
    task_type: TaskType,
    priority: TaskPriority,
    status: TaskStatus,
    title: String,
    description: Option<String>,
    metadata: serde_json::Value,
    result: Option<serde_json::Value>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: TaskId::from_uuid(row.id),
            store_id: StoreId::from_uuid(row.store_id),
            product_id: row.product_id.map(ProductId::from_uuid),
            task_type: row.task_type,
            priority: row.priority,
            status: row.status,
            title: row.title,
            description: row.description,
            metadata: row.metadata,
            result: row.result,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    status: TaskStatus,
    priority: TaskPriority,
    task_type: TaskType,
    count: i64,
}

const TASK_COLUMNS: &str = "id, store_id, product_id, task_type, priority, status, title, \
     description, metadata, result, started_at, completed_at, created_at, updated_at";

fn uuids(ids: &[StoreId]) -> Vec<Uuid> {
    ids.iter().map(StoreId::as_uuid).collect()
}

// =============================================================================
// PostgreSQL Repository
// =============================================================================

/// `PostgreSQL`-backed [`TaskRepository`].
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    /// Create a new task repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task, RepositoryError> {
        let task = task.into_task(Utc::now());
        let sql = format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {TASK_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task.id)
            .bind(task.store_id)
            .bind(task.product_id)
            .bind(task.task_type)
            .bind(task.priority)
            .bind(task.status)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.metadata)
            .bind(&task.result)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.created_at)
            .bind(task.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, RepositoryError> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn save(&self, task: &Task, previous: TaskStatus) -> Result<Task, RepositoryError> {
        let sql = format!(
            "UPDATE tasks SET \
                title = $3, \
                description = $4, \
                priority = $5, \
                status = $6, \
                metadata = $7, \
                result = $8, \
                started_at = COALESCE(started_at, $9), \
                completed_at = COALESCE(completed_at, $10), \
                updated_at = $11 \
             WHERE id = $1 AND status = $2 \
             RETURNING {TASK_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task.id)
            .bind(previous)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.priority)
            .bind(task.status)
            .bind(&task.metadata)
            .bind(&task.result)
            .bind(task.started_at)
            .bind(task.completed_at)
            .bind(task.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        match self.get(task.id).await? {
            Some(_) => Err(RepositoryError::Conflict(
                "task status changed concurrently".to_string(),
            )),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete(&self, id: TaskId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, RepositoryError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE ($1::uuid[] IS NULL OR store_id = ANY($1)) \
               AND ($2::task_status IS NULL OR status = $2) \
               AND ($3::task_priority IS NULL OR priority = $3) \
               AND ($4::task_type IS NULL OR task_type = $4) \
             ORDER BY CASE priority \
                 WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, \
               created_at DESC \
             LIMIT $5 OFFSET $6"
        );

        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(filter.store_ids.as_deref().map(uuids))
            .bind(filter.status)
            .bind(filter.priority)
            .bind(filter.task_type)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn summary(&self, store_ids: Option<&[StoreId]>) -> Result<TaskSummary, RepositoryError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r"
            SELECT status, priority, task_type, COUNT(*) AS count
            FROM tasks
            WHERE ($1::uuid[] IS NULL OR store_id = ANY($1))
            GROUP BY status, priority, task_type
            ",
        )
        .bind(store_ids.map(uuids))
        .fetch_all(&self.pool)
        .await?;

        let mut summary = TaskSummary::default();
        for row in rows {
            summary.add(row.status, row.priority, row.task_type, row.count);
        }
        Ok(summary)
    }
}
