//! Task REST API Routes
//!
//! Reads go through the [`TaskCache`]; writes go through it too so every
//! successful mutation invalidates the cached copies. Write handlers expect
//! the auth middleware to have run and take the caller from [`CurrentUser`].

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tasklane_core::{Activity, ListingParams, TaskId, TaskInput, UserId};
use tasklane_storage::{TaskCache, UserStore};

use crate::{
    error::{ApiError, ApiResult},
    middleware::CurrentUser,
    types::{CreatedResponse, MessageResponse, UpdateResponse},
};

// ============================================================================
// INPUT HELPERS
// ============================================================================

/// Parse a task id path segment. Non-numeric ids are a 400, not a 404.
pub(crate) fn parse_task_id(raw: &str) -> ApiResult<TaskId> {
    raw.parse::<TaskId>().map_err(|e| {
        tracing::debug!(id = %raw, error = %e, "Rejected task id");
        ApiError::invalid_input("Incorrect Input data provided")
    })
}

/// Unwrap a JSON body, answering 400 in the error envelope on bad input.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Loading input data failed");
        ApiError::invalid_input("Incorrect Input data provided")
    })
}

/// Audit rows are best-effort: a failure is logged, never surfaced.
pub(crate) async fn record_activity(users: &dyn UserStore, user: UserId, activity: Activity) {
    if let Err(e) = users.record_activity(user, activity).await {
        tracing::warn!(user_id = %user, activity = %activity, error = %e, "Failed to record activity");
    }
}

// ============================================================================
// READ HANDLERS
// ============================================================================

/// GET /tasks - One page of live tasks.
pub async fn list_tasks(
    State(tasks): State<Arc<TaskCache>>,
    params: Result<Query<ListingParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params.map_err(|e| {
        tracing::debug!(error = %e, "Rejected listing query");
        ApiError::invalid_input("Incorrect Input data provided")
    })?;
    let query = params.normalize();
    let page = tasks.list(&query).await?;
    Ok(Json(page))
}

/// GET /tasks/:id - A single live task.
pub async fn get_task(
    State(tasks): State<Arc<TaskCache>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_task_id(&id)?;
    let task = tasks.get_by_id(id).await?;
    Ok(Json(task))
}

// ============================================================================
// WRITE HANDLERS
// ============================================================================

/// POST /tasks - Create a task owned by the caller.
pub async fn create_task(
    State(tasks): State<Arc<TaskCache>>,
    State(users): State<Arc<dyn UserStore>>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<TaskInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = json_body(body)?;
    let today = chrono::Utc::now().date_naive();
    let draft = input.into_draft(today).map_err(|e| ApiError::validation_failed(&e))?;

    let task = tasks.create(user.user_id, &draft).await?;
    tracing::info!(task_id = %task.id, user_id = %user.user_id, "Task created");
    record_activity(users.as_ref(), user.user_id, Activity::TaskCreated).await;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            status: true,
            message: "Task Created Successfully".to_string(),
            task,
        }),
    ))
}

/// PUT /tasks/update/:id - Update a task the caller owns.
///
/// A `version` in the body makes the update conditional on it.
pub async fn update_task(
    State(tasks): State<Arc<TaskCache>>,
    State(users): State<Arc<dyn UserStore>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    body: Result<Json<TaskInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_task_id(&id)?;
    let input = json_body(body)?;
    let changes = input.into_changes().map_err(|e| ApiError::validation_failed(&e))?;

    let version = tasks.update(id, user.user_id, changes).await?;
    tracing::info!(task_id = %id, user_id = %user.user_id, version, "Task updated");
    record_activity(users.as_ref(), user.user_id, Activity::TaskUpdated).await;

    Ok(Json(UpdateResponse {
        status: true,
        message: "Task Updated Successfully".to_string(),
        version,
    }))
}

/// DELETE /tasks/delete/:id - Soft-delete a task the caller owns.
pub async fn delete_task(
    State(tasks): State<Arc<TaskCache>>,
    State(users): State<Arc<dyn UserStore>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_task_id(&id)?;
    tasks.soft_delete(id, user.user_id).await?;
    tracing::info!(task_id = %id, user_id = %user.user_id, "Task deleted");
    record_activity(users.as_ref(), user.user_id, Activity::TaskDeleted).await;

    Ok(Json(MessageResponse::ok("Deleted Successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_parse_task_id() {
        assert_eq!(parse_task_id("42").ok(), Some(TaskId::new(42)));
        assert_eq!(parse_task_id(" 7 ").ok(), Some(TaskId::new(7)));
        let err = parse_task_id("abc").err().map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::InvalidInput));
    }
}
