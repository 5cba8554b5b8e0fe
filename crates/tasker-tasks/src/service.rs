//! Task operations scoped to an authenticated user.
//!
//! Every mutation loads the whole aggregate, checks ownership, applies the
//! rules in [`crate::aggregate`] and writes the aggregate back inside one
//! store transaction. A task (or sub-task) owned by someone else is reported
//! as not found, so foreign ids are indistinguishable from unknown ones.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use tasker_core::ids::{SubTaskId, TaskId, UserId};
use tasker_core::model::{SubTask, Task};
use tasker_core::ServiceError;
use tasker_store::{StoreError, TaskEdit, TaskStore};

use crate::aggregate;
use crate::filter::{TaskFilter, TaskListing};
use crate::types::{clean_title, NewSubTask, NewTask, TaskUpdate};

const TASK_NOT_FOUND: &str = "Task not found";
const SUB_TASK_NOT_FOUND: &str = "SubTask not found";

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(user_id = %user))]
    pub fn list(&self, user: &UserId, filter: TaskFilter) -> Result<TaskListing, ServiceError> {
        let now = Utc::now();
        let mut tasks = self.store.list_tasks(user)?;
        for task in &mut tasks {
            aggregate::refresh(task, now);
        }
        Ok(TaskListing::select(filter, tasks))
    }

    #[instrument(skip(self), fields(user_id = %user, task_id = %id))]
    pub fn get(&self, user: &UserId, id: &TaskId) -> Result<Task, ServiceError> {
        let mut task = self.owned_task(user, id)?;
        aggregate::refresh(&mut task, Utc::now());
        Ok(task)
    }

    #[instrument(skip(self, input), fields(user_id = %user))]
    pub fn create(&self, user: &UserId, input: NewTask) -> Result<Task, ServiceError> {
        let now = Utc::now();
        let id = TaskId::new();
        let sub_tasks = input
            .sub_tasks
            .iter()
            .enumerate()
            .map(|(i, s)| {
                clean_title(&s.title, &format!("sub_tasks[{i}].title"))
                    .map(|title| SubTask::new(id.clone(), title, now))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut task = Task {
            id,
            user_id: user.clone(),
            title: clean_title(&input.title, "title")?,
            description: input.description,
            deadline: input.deadline,
            completed: false,
            progress: 0.0,
            overdue: false,
            sub_tasks,
            created_at: now,
            updated_at: now,
        };
        aggregate::refresh(&mut task, now);

        self.store.insert_task(&task)?;
        info!(task_id = %task.id, sub_tasks = task.sub_tasks.len(), "task created");
        Ok(task)
    }

    #[instrument(skip(self, input), fields(user_id = %user, task_id = %id))]
    pub fn update(&self, user: &UserId, id: &TaskId, input: TaskUpdate) -> Result<Task, ServiceError> {
        let now = Utc::now();
        let title = clean_title(&input.title, "title")?;

        self.edit_owned(user, id, &mut |task| {
            task.title = title.clone();
            task.description = input.description.clone();
            task.deadline = input.deadline;
            task.updated_at = now;

            if let Some(incoming) = &input.sub_tasks {
                let outcome = aggregate::reconcile_sub_tasks(task, incoming, now)
                    .map_err(StoreError::Rejected)?;
                debug!(
                    kept = outcome.kept,
                    added = outcome.added,
                    removed = outcome.removed.len(),
                    ignored = outcome.ignored.len(),
                    "sub-tasks reconciled"
                );
            }
            aggregate::refresh(task, now);
            Ok(())
        })
    }

    #[instrument(skip(self), fields(user_id = %user, task_id = %id))]
    pub fn delete(&self, user: &UserId, id: &TaskId) -> Result<(), ServiceError> {
        self.owned_task(user, id)?;
        if !self.store.delete_task(id)? {
            return Err(ServiceError::not_found(TASK_NOT_FOUND));
        }
        info!("task deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user, task_id = %id))]
    pub fn toggle_task(&self, user: &UserId, id: &TaskId) -> Result<Task, ServiceError> {
        let now = Utc::now();
        let task = self.edit_owned(user, id, &mut |task| {
            aggregate::toggle_task(task, now);
            Ok(())
        })?;
        debug!(completed = task.completed, "task toggled");
        Ok(task)
    }

    #[instrument(skip(self), fields(user_id = %user, sub_task_id = %id))]
    pub fn toggle_sub_task(
        &self,
        user: &UserId,
        id: &SubTaskId,
    ) -> Result<(Task, SubTask), ServiceError> {
        let now = Utc::now();
        let mut toggled = None;
        let task = self.edit_parent(user, id, &mut |task| {
            toggled = aggregate::toggle_sub_task(task, id, now);
            match toggled {
                Some(_) => Ok(()),
                None => Err(rejected(SUB_TASK_NOT_FOUND)),
            }
        })?;
        let sub = toggled.ok_or_else(|| ServiceError::not_found(SUB_TASK_NOT_FOUND))?;
        debug!(completed = sub.completed, task_completed = task.completed, "sub-task toggled");
        Ok((task, sub))
    }

    #[instrument(skip(self, input), fields(user_id = %user, task_id = %input.task_id))]
    pub fn create_sub_task(&self, user: &UserId, input: NewSubTask) -> Result<SubTask, ServiceError> {
        let title = clean_title(&input.title, "title")?;
        let now = Utc::now();
        let mut created = None;
        self.edit_owned(user, &input.task_id, &mut |task| {
            created = Some(aggregate::add_sub_task(task, title.clone(), now));
            Ok(())
        })?;
        let sub = created.ok_or_else(|| ServiceError::internal("sub-task was not added"))?;
        info!(sub_task_id = %sub.id, "sub-task created");
        Ok(sub)
    }

    #[instrument(skip(self), fields(user_id = %user, sub_task_id = %id))]
    pub fn delete_sub_task(&self, user: &UserId, id: &SubTaskId) -> Result<(), ServiceError> {
        let now = Utc::now();
        self.edit_parent(user, id, &mut |task| {
            if aggregate::remove_sub_task(task, id, now) {
                Ok(())
            } else {
                Err(rejected(SUB_TASK_NOT_FOUND))
            }
        })?;
        info!("sub-task deleted");
        Ok(())
    }

    fn owned_task(&self, user: &UserId, id: &TaskId) -> Result<Task, ServiceError> {
        match self.store.get_task(id)? {
            Some(task) if &task.user_id == user => Ok(task),
            _ => Err(ServiceError::not_found(TASK_NOT_FOUND)),
        }
    }

    /// Run `edit` on task `id` inside the store's transaction, once the
    /// caller is confirmed as its owner.
    fn edit_owned(
        &self,
        user: &UserId,
        id: &TaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Task, ServiceError> {
        self.store
            .modify_task(id, &mut |task| {
                if &task.user_id != user {
                    return Err(rejected(TASK_NOT_FOUND));
                }
                edit(task)
            })?
            .ok_or_else(|| ServiceError::not_found(TASK_NOT_FOUND))
    }

    /// Same as `edit_owned`, for the task that owns sub-task `id`.
    fn edit_parent(
        &self,
        user: &UserId,
        id: &SubTaskId,
        edit: &mut TaskEdit<'_>,
    ) -> Result<Task, ServiceError> {
        self.store
            .modify_parent(id, &mut |task| {
                if &task.user_id != user {
                    return Err(rejected(SUB_TASK_NOT_FOUND));
                }
                edit(task)
            })?
            .ok_or_else(|| ServiceError::not_found(SUB_TASK_NOT_FOUND))
    }
}

fn rejected(message: &str) -> StoreError {
    StoreError::Rejected(ServiceError::not_found(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use tasker_store::{Database, TaskRepo, UserRepo, UserStore};

    use crate::filter::TaskCategory;
    use crate::types::SubTaskInput;

    struct Fixture {
        service: TaskService,
        db: Database,
        alice: UserId,
        bob: UserId,
    }

    fn setup() -> Fixture {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let alice = users.create_user("alice", "h").unwrap().id;
        let bob = users.create_user("bob", "h").unwrap().id;
        let service = TaskService::new(Arc::new(TaskRepo::new(db.clone())));
        Fixture { service, db, alice, bob }
    }

    fn in_days(days: i64) -> DateTime<Utc> {
        Utc::now() + Duration::days(days)
    }

    fn new_task(title: &str, subs: &[&str]) -> NewTask {
        NewTask {
            title: title.into(),
            description: "desc".into(),
            deadline: in_days(1),
            sub_tasks: subs
                .iter()
                .map(|t| SubTaskInput { id: None, title: (*t).into() })
                .collect(),
        }
    }

    fn sub_task_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM sub_tasks", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
        .unwrap()
    }

    #[test]
    fn create_starts_incomplete_with_zero_progress() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["one", "two"])).unwrap();
        assert!(!task.completed);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.sub_tasks.len(), 2);
        assert!(task.sub_tasks.iter().all(|s| !s.completed && s.task_id == task.id));

        let fetched = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(fetched.sub_tasks.len(), 2);
    }

    #[test]
    fn create_rejects_blank_title() {
        let f = setup();
        let err = f.service.create(&f.alice, new_task("  ", &[])).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = f.service.create(&f.alice, new_task("ok", &["x", ""])).unwrap_err();
        assert_eq!(err, ServiceError::validation("sub_tasks[1].title must not be empty"));
    }

    #[test]
    fn scenario_progress_via_sub_task_toggles() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &[])).unwrap();
        assert_eq!(task.progress, 0.0);

        let first = f
            .service
            .create_sub_task(&f.alice, NewSubTask { task_id: task.id.clone(), title: "one".into() })
            .unwrap();
        let second = f
            .service
            .create_sub_task(&f.alice, NewSubTask { task_id: task.id.clone(), title: "two".into() })
            .unwrap();

        f.service.toggle_sub_task(&f.alice, &first.id).unwrap();
        let got = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(got.progress, 50.0);
        assert!(!got.completed);

        let (parent, sub) = f.service.toggle_sub_task(&f.alice, &second.id).unwrap();
        assert!(sub.completed);
        assert_eq!(parent.progress, 100.0);
        assert!(parent.completed);

        let got = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(got.progress, 100.0);
        assert!(got.completed);
    }

    #[test]
    fn scenario_update_reconciles_by_id() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["keep", "drop"])).unwrap();
        let keep = task.sub_tasks[0].id.clone();
        let drop = task.sub_tasks[1].id.clone();
        f.service.toggle_sub_task(&f.alice, &keep).unwrap();

        let updated = f
            .service
            .update(
                &f.alice,
                &task.id,
                TaskUpdate {
                    title: "A2".into(),
                    description: "new".into(),
                    deadline: in_days(2),
                    sub_tasks: Some(vec![
                        SubTaskInput { id: Some(keep.clone()), title: "keep".into() },
                        SubTaskInput { id: None, title: "fresh".into() },
                    ]),
                },
            )
            .unwrap();

        assert_eq!(updated.title, "A2");
        assert_eq!(updated.sub_tasks.len(), 2);
        assert_eq!(updated.sub_tasks[0].id, keep);
        assert!(updated.sub_tasks[0].completed);
        assert_eq!(updated.sub_tasks[1].title, "fresh");
        assert_eq!(updated.progress, 50.0);

        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(stored.sub_tasks.len(), 2);
        assert!(stored.sub_task(&drop).is_none());
        assert_eq!(sub_task_rows(&f.db), 2);
    }

    #[test]
    fn update_without_sub_tasks_leaves_them_alone() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["x"])).unwrap();
        let updated = f
            .service
            .update(
                &f.alice,
                &task.id,
                TaskUpdate {
                    title: "B".into(),
                    description: String::new(),
                    deadline: in_days(3),
                    sub_tasks: None,
                },
            )
            .unwrap();
        assert_eq!(updated.sub_tasks.len(), 1);
        assert_eq!(updated.title, "B");
    }

    #[test]
    fn toggle_task_cascades_and_round_trips() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["a", "b"])).unwrap();
        f.service.toggle_sub_task(&f.alice, &task.sub_tasks[0].id).unwrap();

        let done = f.service.toggle_task(&f.alice, &task.id).unwrap();
        assert!(done.completed);
        assert_eq!(done.progress, 100.0);
        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert!(stored.sub_tasks.iter().all(|s| s.completed));

        let reopened = f.service.toggle_task(&f.alice, &task.id).unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.progress, 0.0);
        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert!(stored.sub_tasks.iter().all(|s| !s.completed));
    }

    #[test]
    fn list_filters_by_category() {
        let f = setup();
        f.service.create(&f.alice, new_task("open", &[])).unwrap();
        let done = f.service.create(&f.alice, new_task("done", &[])).unwrap();
        f.service.toggle_task(&f.alice, &done.id).unwrap();
        let mut late = new_task("late", &[]);
        late.deadline = in_days(-1);
        f.service.create(&f.alice, late).unwrap();
        f.service.create(&f.bob, new_task("bobs", &[])).unwrap();

        let all = f.service.list(&f.alice, TaskFilter::All).unwrap();
        assert_eq!(all.tasks.len(), 3);
        assert_eq!(all.message(), "List of all tasks");

        let overdue = f.service.list(&f.alice, TaskFilter::Overdue).unwrap();
        assert_eq!(overdue.tasks.len(), 1);
        assert!(overdue.tasks[0].overdue);
        assert_eq!(TaskCategory::of(&overdue.tasks[0]), TaskCategory::Overdue);

        let completed = f.service.list(&f.alice, TaskFilter::Completed).unwrap();
        assert_eq!(completed.tasks.len(), 1);
        assert_eq!(completed.tasks[0].progress, 100.0);

        let ongoing = f.service.list(&f.alice, TaskFilter::Ongoing).unwrap();
        assert_eq!(ongoing.tasks.len(), 1);
        assert_eq!(ongoing.tasks[0].progress, 0.0);
    }

    #[test]
    fn delete_removes_task_and_sub_tasks() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["a", "b"])).unwrap();
        assert_eq!(sub_task_rows(&f.db), 2);

        f.service.delete(&f.alice, &task.id).unwrap();
        assert_eq!(sub_task_rows(&f.db), 0);
        assert!(matches!(
            f.service.delete(&f.alice, &task.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn other_users_cannot_touch_a_task() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["a"])).unwrap();
        let sub = task.sub_tasks[0].id.clone();

        let not_found = |r: Result<(), ServiceError>| matches!(r, Err(ServiceError::NotFound(_)));
        assert!(not_found(f.service.get(&f.bob, &task.id).map(|_| ())));
        assert!(not_found(f.service.toggle_task(&f.bob, &task.id).map(|_| ())));
        assert!(not_found(f.service.toggle_sub_task(&f.bob, &sub).map(|_| ())));
        assert!(not_found(f.service.delete_sub_task(&f.bob, &sub)));
        assert!(not_found(f.service.delete(&f.bob, &task.id)));
        assert!(not_found(
            f.service
                .create_sub_task(&f.bob, NewSubTask { task_id: task.id.clone(), title: "x".into() })
                .map(|_| ())
        ));

        let untouched = f.service.get(&f.alice, &task.id).unwrap();
        assert!(!untouched.completed);
        assert_eq!(untouched.sub_tasks.len(), 1);
    }

    fn rewrite_everything() -> TaskUpdate {
        TaskUpdate {
            title: "rewritten".into(),
            description: "rewritten".into(),
            deadline: in_days(9),
            sub_tasks: Some(Vec::new()),
        }
    }

    #[test]
    fn update_is_scoped_to_the_owner() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("secret", &["a"])).unwrap();

        let err = f.service.update(&f.bob, &task.id, rewrite_everything()).unwrap_err();
        assert_eq!(err, ServiceError::not_found("Task not found"));

        let err = f
            .service
            .update(&f.alice, &TaskId::from_raw("task_nope"), rewrite_everything())
            .unwrap_err();
        assert_eq!(err, ServiceError::not_found("Task not found"));

        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(stored.title, "secret");
        assert_eq!(stored.description, "desc");
        assert_eq!(stored.sub_tasks, task.sub_tasks);
        assert_eq!(sub_task_rows(&f.db), 1);
    }

    #[test]
    fn invalid_reconcile_leaves_task_untouched() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["a"])).unwrap();
        let mut bad = rewrite_everything();
        bad.sub_tasks = Some(vec![SubTaskInput { id: None, title: "  ".into() }]);

        let err = f.service.update(&f.alice, &task.id, bad).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "got {err:?}");

        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(stored.title, "A");
        assert_eq!(stored.sub_tasks, task.sub_tasks);
    }

    #[test]
    fn concurrent_edits_keep_every_created_sub_task() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["seed"])).unwrap();
        let seed = task.sub_tasks[0].id.clone();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let (f, task) = (&f, &task);
                scope.spawn(move || {
                    for i in 0..5 {
                        let input = NewSubTask {
                            task_id: task.id.clone(),
                            title: format!("w{worker}-{i}"),
                        };
                        f.service.create_sub_task(&f.alice, input).unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..10 {
                    f.service.toggle_sub_task(&f.alice, &seed).unwrap();
                    f.service.toggle_task(&f.alice, &task.id).unwrap();
                }
            });
        });

        let stored = f.service.get(&f.alice, &task.id).unwrap();
        assert_eq!(stored.sub_tasks.len(), 21);
        assert_eq!(sub_task_rows(&f.db), 21);
    }

    #[test]
    fn sub_task_crud_keeps_parent_consistent() {
        let f = setup();
        let task = f.service.create(&f.alice, new_task("A", &["a"])).unwrap();
        f.service.toggle_sub_task(&f.alice, &task.sub_tasks[0].id).unwrap();
        assert!(f.service.get(&f.alice, &task.id).unwrap().completed);

        let extra = f
            .service
            .create_sub_task(&f.alice, NewSubTask { task_id: task.id.clone(), title: "b".into() })
            .unwrap();
        let got = f.service.get(&f.alice, &task.id).unwrap();
        assert!(!got.completed);
        assert_eq!(got.progress, 50.0);

        f.service.delete_sub_task(&f.alice, &extra.id).unwrap();
        let got = f.service.get(&f.alice, &task.id).unwrap();
        assert!(got.completed);
        assert_eq!(got.progress, 100.0);

        assert!(matches!(
            f.service.delete_sub_task(&f.alice, &extra.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let f = setup();
        assert!(matches!(
            f.service.get(&f.alice, &TaskId::from_raw("task_nope")),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            f.service.toggle_sub_task(&f.alice, &SubTaskId::from_raw("sub_nope")),
            Err(ServiceError::NotFound(_))
        ));
    }

    /// Store double whose sub-task rows point at a task that cannot be loaded.
    struct OrphanStore;

    impl TaskStore for OrphanStore {
        fn list_tasks(&self, _: &UserId) -> Result<Vec<Task>, StoreError> {
            Ok(Vec::new())
        }
        fn get_task(&self, _: &TaskId) -> Result<Option<Task>, StoreError> {
            Ok(None)
        }
        fn insert_task(&self, _: &Task) -> Result<(), StoreError> {
            Ok(())
        }
        fn modify_task(
            &self,
            _: &TaskId,
            _: &mut TaskEdit<'_>,
        ) -> Result<Option<Task>, StoreError> {
            Ok(None)
        }
        fn modify_parent(
            &self,
            id: &SubTaskId,
            _: &mut TaskEdit<'_>,
        ) -> Result<Option<Task>, StoreError> {
            Err(StoreError::Database(format!("sub-task {id} points at missing task task_gone")))
        }
        fn delete_task(&self, _: &TaskId) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[test]
    fn missing_parent_is_internal_error() {
        let service = TaskService::new(Arc::new(OrphanStore));
        let err = service
            .toggle_sub_task(&UserId::new(), &SubTaskId::from_raw("sub_1"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)), "got {err:?}");
    }
}
