//! HTTP handlers. Each one resolves the caller, runs the synchronous service
//! call on the blocking pool and wraps the result in a JSON envelope.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tasker_core::ids::{SubTaskId, TaskId};
use tasker_core::ServiceError;
use tasker_tasks::{NewSubTask, NewTask, TaskFilter, TaskUpdate};

use crate::error::ApiError;
use crate::extract::{AuthUser, JsonBody};
use crate::server::AppState;

type ApiResult<T = Json<Value>> = Result<T, ApiError>;

/// Run a blocking service call off the async executor.
async fn blocking<F, T, E>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}

// ── Identity ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Credentials>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let gate = state.gate.clone();
    blocking(move || gate.register(&body.username, &body.password)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "message": "User registered successfully" })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Credentials>,
) -> ApiResult {
    let gate = state.gate.clone();
    let issued = blocking(move || gate.login(&body.username, &body.password)).await?;
    Ok(Json(json!({
        "status": "success",
        "token": issued.token,
        "expires_at": issued.expires_at,
    })))
}

pub async fn logout(State(state): State<AppState>, AuthUser(session): AuthUser) -> ApiResult {
    let gate = state.gate.clone();
    blocking(move || gate.logout(&session)).await?;
    Ok(Json(json!({ "status": "success", "message": "Logged out successfully" })))
}

// ── Tasks ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let filter = TaskFilter::from_query(query.filter.as_deref());
    let tasks = state.tasks.clone();
    let listing = blocking(move || tasks.list(&session.user_id, filter)).await?;
    Ok(Json(json!({
        "status": "success",
        "message": listing.message(),
        "tasks": listing.tasks,
    })))
}

pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    let task = blocking(move || tasks.get(&session.user_id, &id)).await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    JsonBody(body): JsonBody<NewTask>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tasks = state.tasks.clone();
    let task = blocking(move || tasks.create(&session.user_id, body)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "success", "task": task }))))
}

pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<TaskId>,
    JsonBody(body): JsonBody<TaskUpdate>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    let task = blocking(move || tasks.update(&session.user_id, &id, body)).await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    blocking(move || tasks.delete(&session.user_id, &id)).await?;
    Ok(Json(json!({ "status": "success", "message": "Task deleted successfully" })))
}

pub async fn toggle_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<TaskId>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    let task = blocking(move || tasks.toggle_task(&session.user_id, &id)).await?;
    Ok(Json(json!({ "status": "success", "task": task })))
}

// ── Sub-tasks ───────────────────────────────────────────────────────────────

pub async fn create_sub_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    JsonBody(body): JsonBody<NewSubTask>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let tasks = state.tasks.clone();
    let sub = blocking(move || tasks.create_sub_task(&session.user_id, body)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "success", "subtask": sub }))))
}

pub async fn delete_sub_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<SubTaskId>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    blocking(move || tasks.delete_sub_task(&session.user_id, &id)).await?;
    Ok(Json(json!({ "status": "success", "message": "SubTask deleted successfully" })))
}

pub async fn toggle_sub_task(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Path(id): Path<SubTaskId>,
) -> ApiResult {
    let tasks = state.tasks.clone();
    let (task, sub) = blocking(move || tasks.toggle_sub_task(&session.user_id, &id)).await?;
    Ok(Json(json!({ "status": "success", "task": task, "subtask": sub })))
}

// ── Misc ────────────────────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn not_found() -> ApiError {
    ApiError(ServiceError::not_found("Route not found"))
}
