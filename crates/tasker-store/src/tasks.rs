use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;

use tasker_core::ids::{SubTaskId, TaskId, UserId};
use tasker_core::model::{SubTask, Task};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// An in-place edit of a loaded aggregate. Returning `Err` rolls the whole
/// read-modify-write back.
pub type TaskEdit<'a> = dyn FnMut(&mut Task) -> Result<(), StoreError> + 'a;

/// Persistence for the task aggregate (a task row plus its sub-task rows).
///
/// Mutations load, edit and write the aggregate inside one transaction while
/// holding the connection lock, so two writers never work from the same
/// stale copy and readers never observe a half-reconciled sub-task set.
pub trait TaskStore: Send + Sync {
    /// All tasks owned by `owner`, with sub-tasks, in creation order.
    fn list_tasks(&self, owner: &UserId) -> Result<Vec<Task>, StoreError>;

    fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Insert a new task and all of its sub-tasks.
    fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Apply `edit` to task `id` and persist the result. Sub-tasks the edit
    /// dropped are deleted, the rest upserted. `None` if no such task exists.
    fn modify_task(
        &self,
        id: &TaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Option<Task>, StoreError>;

    /// Like [`TaskStore::modify_task`], for the task owning sub-task `id`.
    fn modify_parent(
        &self,
        id: &SubTaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Option<Task>, StoreError>;

    /// Delete the task and its sub-tasks. Returns `false` if no such task exists.
    fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError>;
}

pub struct TaskRepo {
    db: Database,
}

impl TaskRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

const TASK_COLUMNS: &str =
    "id, user_id, title, description, deadline, completed, progress, created_at, updated_at";
const SUB_TASK_COLUMNS: &str = "id, task_id, title, completed, created_at, updated_at";

impl TaskStore for TaskRepo {
    #[instrument(skip(self), fields(user_id = %owner))]
    fn list_tasks(&self, owner: &UserId) -> Result<Vec<Task>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY id"
            ))?;
            let mut rows = stmt.query([owner.as_str()])?;
            let mut tasks = Vec::new();
            while let Some(row) = rows.next()? {
                tasks.push(row_to_task(row)?);
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {SUB_TASK_COLUMNS} FROM sub_tasks
                 WHERE task_id IN (SELECT id FROM tasks WHERE user_id = ?1)
                 ORDER BY id"
            ))?;
            let mut rows = stmt.query([owner.as_str()])?;
            let mut by_task: HashMap<TaskId, Vec<SubTask>> = HashMap::new();
            while let Some(row) = rows.next()? {
                let sub = row_to_sub_task(row)?;
                by_task.entry(sub.task_id.clone()).or_default().push(sub);
            }

            for task in &mut tasks {
                task.sub_tasks = by_task.remove(&task.id).unwrap_or_default();
            }
            Ok(tasks)
        })
    }

    #[instrument(skip(self), fields(task_id = %id))]
    fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.db.with_conn(|conn| load_task(conn, id))
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, sub_tasks = task.sub_tasks.len()))]
    fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO tasks (id, user_id, title, description, deadline, completed, progress, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    task.id.as_str(),
                    task.user_id.as_str(),
                    task.title,
                    task.description,
                    row_helpers::format_time(&task.deadline),
                    task.completed,
                    task.progress,
                    row_helpers::format_time(&task.created_at),
                    row_helpers::format_time(&task.updated_at),
                ],
            )?;
            for sub in &task.sub_tasks {
                upsert_sub_task(tx, sub)?;
            }
            Ok(())
        })
    }

    #[instrument(skip(self, edit), fields(task_id = %id))]
    fn modify_task(
        &self,
        id: &TaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Option<Task>, StoreError> {
        self.db.with_tx(|tx| {
            let Some(mut task) = load_task(tx, id)? else {
                return Ok(None);
            };
            edit(&mut task)?;
            write_task(tx, &task)?;
            Ok(Some(task))
        })
    }

    #[instrument(skip(self, edit), fields(sub_task_id = %id))]
    fn modify_parent(
        &self,
        id: &SubTaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Option<Task>, StoreError> {
        self.db.with_tx(|tx| {
            let parent: Option<String> = tx
                .query_row("SELECT task_id FROM sub_tasks WHERE id = ?1", [id.as_str()], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(parent) = parent.map(TaskId::from_raw) else {
                return Ok(None);
            };
            let Some(mut task) = load_task(tx, &parent)? else {
                return Err(StoreError::Database(format!(
                    "sub-task {id} points at missing task {parent}"
                )));
            };
            edit(&mut task)?;
            write_task(tx, &task)?;
            Ok(Some(task))
        })
    }

    #[instrument(skip(self), fields(task_id = %id))]
    fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.db.with_tx(|tx| {
            tx.execute("DELETE FROM sub_tasks WHERE task_id = ?1", [id.as_str()])?;
            let removed = tx.execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])?;
            Ok(removed > 0)
        })
    }
}

fn load_task(conn: &Connection, id: &TaskId) -> Result<Option<Task>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
    let mut rows = stmt.query([id.as_str()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut task = row_to_task(row)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {SUB_TASK_COLUMNS} FROM sub_tasks WHERE task_id = ?1 ORDER BY id"
    ))?;
    let mut rows = stmt.query([id.as_str()])?;
    while let Some(row) = rows.next()? {
        task.sub_tasks.push(row_to_sub_task(row)?);
    }
    Ok(Some(task))
}

/// Write an edited aggregate back: the task row, then delete stored
/// sub-tasks missing from `task.sub_tasks` and upsert the rest. Only sound
/// on a copy loaded in the same transaction.
fn write_task(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    let updated = conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, deadline = ?3, completed = ?4,
                progress = ?5, updated_at = ?6
         WHERE id = ?7",
        rusqlite::params![
            task.title,
            task.description,
            row_helpers::format_time(&task.deadline),
            task.completed,
            task.progress,
            row_helpers::format_time(&task.updated_at),
            task.id.as_str(),
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("task {}", task.id)));
    }

    let keep: HashSet<&str> = task.sub_tasks.iter().map(|s| s.id.as_str()).collect();
    let stored: Vec<String> = conn
        .prepare("SELECT id FROM sub_tasks WHERE task_id = ?1")?
        .query_map([task.id.as_str()], |row| row.get(0))?
        .collect::<Result<_, _>>()?;
    for id in stored.iter().filter(|id| !keep.contains(id.as_str())) {
        conn.execute("DELETE FROM sub_tasks WHERE id = ?1", [id])?;
    }

    for sub in &task.sub_tasks {
        upsert_sub_task(conn, sub)?;
    }
    Ok(())
}

/// Insert a sub-task, or update title/completion if it already exists under
/// the same task. A row belonging to another task is never touched.
fn upsert_sub_task(conn: &Connection, sub: &SubTask) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO sub_tasks (id, task_id, title, completed, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             completed = excluded.completed,
             updated_at = excluded.updated_at
         WHERE sub_tasks.task_id = excluded.task_id",
        rusqlite::params![
            sub.id.as_str(),
            sub.task_id.as_str(),
            sub.title,
            sub.completed,
            row_helpers::format_time(&sub.created_at),
            row_helpers::format_time(&sub.updated_at),
        ],
    )?;
    Ok(())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, StoreError> {
    Ok(Task {
        id: TaskId::from_raw(row_helpers::get::<String>(row, 0, "tasks", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "tasks", "user_id")?),
        title: row_helpers::get(row, 2, "tasks", "title")?,
        description: row_helpers::get(row, 3, "tasks", "description")?,
        deadline: row_helpers::get_time(row, 4, "tasks", "deadline")?,
        completed: row_helpers::get(row, 5, "tasks", "completed")?,
        progress: row_helpers::get(row, 6, "tasks", "progress")?,
        overdue: false,
        sub_tasks: Vec::new(),
        created_at: row_helpers::get_time(row, 7, "tasks", "created_at")?,
        updated_at: row_helpers::get_time(row, 8, "tasks", "updated_at")?,
    })
}

fn row_to_sub_task(row: &rusqlite::Row<'_>) -> Result<SubTask, StoreError> {
    Ok(SubTask {
        id: SubTaskId::from_raw(row_helpers::get::<String>(row, 0, "sub_tasks", "id")?),
        task_id: TaskId::from_raw(row_helpers::get::<String>(row, 1, "sub_tasks", "task_id")?),
        title: row_helpers::get(row, 2, "sub_tasks", "title")?,
        completed: row_helpers::get(row, 3, "sub_tasks", "completed")?,
        created_at: row_helpers::get_time(row, 4, "sub_tasks", "created_at")?,
        updated_at: row_helpers::get_time(row, 5, "sub_tasks", "updated_at")?,
    })
}
