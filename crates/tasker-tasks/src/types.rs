use chrono::{DateTime, Utc};
use serde::Deserialize;

use tasker_core::ids::{SubTaskId, TaskId};
use tasker_core::ServiceError;

/// A sub-task as supplied by a client. `id` is absent for new items;
/// completion state is host-controlled and never read from input.
#[derive(Clone, Debug, Deserialize)]
pub struct SubTaskInput {
    #[serde(default)]
    pub id: Option<SubTaskId>,
    pub title: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub sub_tasks: Vec<SubTaskInput>,
}

/// Full replacement of a task's editable fields.
///
/// `sub_tasks: None` leaves the sub-task set untouched; `Some(vec![])`
/// removes every sub-task.
#[derive(Clone, Debug, Deserialize)]
pub struct TaskUpdate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub sub_tasks: Option<Vec<SubTaskInput>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSubTask {
    pub task_id: TaskId,
    pub title: String,
}

/// Trim a title and reject it when empty.
pub(crate) fn clean_title(raw: &str, field: &str) -> Result<String, ServiceError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ServiceError::validation(format!("{field} must not be empty")));
    }
    Ok(title.to_string())
}
