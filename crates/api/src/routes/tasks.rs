//! Task routes.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use amts_core::{StoreId, TaskId};

use super::{ApiJson, ApiQuery, Message, optional_json};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::{NewTask, Task, TaskSummary, TaskUpdate};
use crate::services::tasks::TaskQuery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/stats/summary", get(summary))
        .route("/{id}", get(show).put(update).delete(remove))
        .route("/{id}/start", post(start))
        .route("/{id}/complete", post(complete))
        .route("/{id}/fail", post(fail))
}

/// GET /api/tasks?store_id&status&priority&task_type&limit&offset
async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(state.tasks().list(user.id, query).await?))
}

/// POST /api/tasks
#[instrument(skip_all, fields(user_id = %user.id))]
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(task): ApiJson<NewTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state.tasks().create(user.id, task).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/{id}
async fn show(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.tasks().get(id, user.id).await?))
}

/// PUT /api/tasks/{id}
async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
    ApiJson(update): ApiJson<TaskUpdate>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.tasks().update(id, user.id, update).await?))
}

/// DELETE /api/tasks/{id}
async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
) -> Result<Json<Message>, AppError> {
    state.tasks().delete(id, user.id).await?;
    Ok(Json(Message::new("Task deleted successfully")))
}

/// POST /api/tasks/{id}/start
async fn start(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.tasks().start(id, user.id).await?))
}

/// Optional body of the complete action.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompleteRequest {
    pub result: Option<serde_json::Value>,
}

/// POST /api/tasks/{id}/complete
async fn complete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
    body: Bytes,
) -> Result<Json<Task>, AppError> {
    let CompleteRequest { result } = optional_json(&body)?;
    Ok(Json(state.tasks().complete(id, user.id, result).await?))
}

/// Optional body of the fail action.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FailRequest {
    pub error: Option<String>,
}

/// POST /api/tasks/{id}/fail
async fn fail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<TaskId>,
    body: Bytes,
) -> Result<Json<Task>, AppError> {
    let FailRequest { error } = optional_json(&body)?;
    Ok(Json(state.tasks().fail(id, user.id, error).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub store_id: Option<StoreId>,
}

/// GET /api/tasks/stats/summary?store_id
async fn summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> Result<Json<TaskSummary>, AppError> {
    Ok(Json(state.tasks().summary(user.id, query.store_id).await?))
}
