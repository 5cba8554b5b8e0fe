//! Domain records shared by the store, the services and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SubTaskId, TaskId, UserId};

/// A registered account. `password_hash` is a PHC string and never leaves the host.
#[derive(Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// A checklist item owned by exactly one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: SubTaskId,
    pub task_id: TaskId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubTask {
    /// A fresh, incomplete sub-task for `task_id`.
    pub fn new(task_id: TaskId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: SubTaskId::new(),
            task_id,
            title: title.into(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A to-do item together with its sub-tasks.
///
/// `progress` is stored but always derived from `sub_tasks`; `overdue` is
/// computed at read time and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub progress: f64,
    #[serde(default)]
    pub overdue: bool,
    pub sub_tasks: Vec<SubTask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn sub_task(&self, id: &SubTaskId) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|s| &s.id == id)
    }

    pub fn sub_task_mut(&mut self, id: &SubTaskId) -> Option<&mut SubTask> {
        self.sub_tasks.iter_mut().find(|s| &s.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.sub_tasks.iter().filter(|s| s.completed).count()
    }
}
