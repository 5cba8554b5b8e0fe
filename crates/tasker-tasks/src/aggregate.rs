//! Consistency rules between a task and its sub-tasks.
//!
//! Every function here is pure: callers pass "now" and persist the result.
//! Rules:
//!
//! - **Progress**: `100 * done / total` when the task has sub-tasks,
//!   otherwise 100 if the task is completed and 0 if not.
//! - **Overdue**: not completed and `now` is past the deadline. Never stored.
//! - **Top-down toggle**: completing a task completes every sub-task;
//!   reopening it reopens every sub-task. The previous mix is lost.
//! - **Bottom-up settle**: after a sub-task changes, the task is completed
//!   exactly when all of its sub-tasks are.
//! - **Reconcile**: an update's sub-task list is matched against the stored
//!   set by id. Matched items keep their stored completion, unmatched stored
//!   items are dropped, items without an id are created.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use tasker_core::ids::SubTaskId;
use tasker_core::model::{SubTask, Task};
use tasker_core::ServiceError;

use crate::types::{clean_title, SubTaskInput};

/// Derived progress percentage in `[0, 100]`.
pub fn progress(task: &Task) -> f64 {
    let total = task.sub_tasks.len();
    if total == 0 {
        return if task.completed { 100.0 } else { 0.0 };
    }
    100.0 * task.completed_count() as f64 / total as f64
}

pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    !task.completed && now > task.deadline
}

/// Recompute every derived field. Runs after each mutation and on each read.
pub fn refresh(task: &mut Task, now: DateTime<Utc>) {
    task.progress = progress(task);
    task.overdue = is_overdue(task, now);
}

/// Bottom-up completion: a task with sub-tasks is completed iff all are.
/// A task without sub-tasks keeps its own flag.
pub fn settle_from_sub_tasks(task: &mut Task) {
    if !task.sub_tasks.is_empty() {
        task.completed = task.sub_tasks.iter().all(|s| s.completed);
    }
}

/// Flip the task's completion and force every sub-task to match.
pub fn toggle_task(task: &mut Task, now: DateTime<Utc>) {
    task.completed = !task.completed;
    for sub in &mut task.sub_tasks {
        sub.completed = task.completed;
        sub.updated_at = now;
    }
    task.updated_at = now;
    refresh(task, now);
}

/// Flip one sub-task, then settle the parent. Returns the updated sub-task,
/// or `None` if it does not belong to this task.
pub fn toggle_sub_task(task: &mut Task, id: &SubTaskId, now: DateTime<Utc>) -> Option<SubTask> {
    let sub = task.sub_task_mut(id)?;
    sub.completed = !sub.completed;
    sub.updated_at = now;
    let toggled = sub.clone();

    settle_from_sub_tasks(task);
    task.updated_at = now;
    refresh(task, now);
    Some(toggled)
}

/// Append a fresh sub-task and settle the parent.
pub fn add_sub_task(task: &mut Task, title: String, now: DateTime<Utc>) -> SubTask {
    let sub = SubTask::new(task.id.clone(), title, now);
    task.sub_tasks.push(sub.clone());
    settle_from_sub_tasks(task);
    task.updated_at = now;
    refresh(task, now);
    sub
}

/// Remove a sub-task and settle the parent. Returns `false` if it was not present.
pub fn remove_sub_task(task: &mut Task, id: &SubTaskId, now: DateTime<Utc>) -> bool {
    let before = task.sub_tasks.len();
    task.sub_tasks.retain(|s| &s.id != id);
    if task.sub_tasks.len() == before {
        return false;
    }
    settle_from_sub_tasks(task);
    task.updated_at = now;
    refresh(task, now);
    true
}

/// What a reconcile pass did, for logging and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub kept: usize,
    pub added: usize,
    pub removed: Vec<SubTaskId>,
    pub ignored: Vec<SubTaskId>,
}

/// Replace the task's sub-task set with `incoming`, matched by id.
///
/// Titles come from the request; completion and timestamps of matched items
/// come from storage. Ids not found among the task's current sub-tasks are
/// ignored. Does not touch `task.completed`.
pub fn reconcile_sub_tasks(
    task: &mut Task,
    incoming: &[SubTaskInput],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ServiceError> {
    let mut outcome = ReconcileOutcome::default();
    let mut next = Vec::with_capacity(incoming.len());
    let mut seen: HashSet<SubTaskId> = HashSet::new();

    for (i, input) in incoming.iter().enumerate() {
        let title = clean_title(&input.title, &format!("sub_tasks[{i}].title"))?;
        match &input.id {
            None => {
                next.push(SubTask::new(task.id.clone(), title, now));
                outcome.added += 1;
            }
            Some(id) => match task.sub_task(id) {
                Some(stored) if seen.insert(id.clone()) => {
                    let mut kept = stored.clone();
                    if kept.title != title {
                        kept.title = title;
                        kept.updated_at = now;
                    }
                    next.push(kept);
                    outcome.kept += 1;
                }
                _ => {
                    warn!(task_id = %task.id, sub_task_id = %id, "ignoring unknown or repeated sub-task id");
                    outcome.ignored.push(id.clone());
                }
            },
        }
    }

    outcome.removed = task
        .sub_tasks
        .iter()
        .filter(|s| !seen.contains(&s.id))
        .map(|s| s.id.clone())
        .collect();

    task.sub_tasks = next;
    task.updated_at = now;
    refresh(task, now);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tasker_core::ids::{TaskId, UserId};

    fn task(done: &[bool]) -> Task {
        let now = Utc::now();
        let id = TaskId::new();
        Task {
            id: id.clone(),
            user_id: UserId::new(),
            title: "A".into(),
            description: String::new(),
            deadline: now + Duration::days(1),
            completed: false,
            progress: 0.0,
            overdue: false,
            sub_tasks: done
                .iter()
                .enumerate()
                .map(|(i, &c)| SubTask {
                    completed: c,
                    ..SubTask::new(id.clone(), format!("s{i}"), now)
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn input(id: Option<&SubTaskId>, title: &str) -> SubTaskInput {
        SubTaskInput {
            id: id.cloned(),
            title: title.into(),
        }
    }

    #[test]
    fn progress_is_fraction_of_completed_sub_tasks() {
        assert_eq!(progress(&task(&[true, false])), 50.0);
        assert_eq!(progress(&task(&[true, true, true])), 100.0);
        assert_eq!(progress(&task(&[false, false, false])), 0.0);
        let third = progress(&task(&[true, false, false]));
        assert!((third - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn progress_without_sub_tasks_follows_completion() {
        let mut t = task(&[]);
        assert_eq!(progress(&t), 0.0);
        t.completed = true;
        assert_eq!(progress(&t), 100.0);
    }

    #[test]
    fn overdue_requires_past_deadline_and_open_task() {
        let mut t = task(&[]);
        let later = t.deadline + Duration::seconds(1);
        assert!(!is_overdue(&t, t.deadline));
        assert!(is_overdue(&t, later));
        t.completed = true;
        assert!(!is_overdue(&t, later));
    }

    #[test]
    fn completed_task_is_never_overdue() {
        let mut t = task(&[false]);
        t.deadline = Utc::now() - Duration::days(30);
        toggle_task(&mut t, Utc::now());
        assert!(t.completed);
        assert!(!t.overdue);
    }

    #[test]
    fn toggle_task_forces_sub_tasks_both_ways() {
        let mut t = task(&[true, false, true]);
        let now = Utc::now();

        toggle_task(&mut t, now);
        assert!(t.completed);
        assert_eq!(t.progress, 100.0);
        assert!(t.sub_tasks.iter().all(|s| s.completed));

        toggle_task(&mut t, now);
        assert!(!t.completed);
        assert_eq!(t.progress, 0.0);
        // The original mixed state is not restored.
        assert!(t.sub_tasks.iter().all(|s| !s.completed));
    }

    #[test]
    fn toggle_sub_task_settles_parent() {
        let mut t = task(&[false, false]);
        let now = Utc::now();
        let first = t.sub_tasks[0].id.clone();
        let second = t.sub_tasks[1].id.clone();

        let sub = toggle_sub_task(&mut t, &first, now).unwrap();
        assert!(sub.completed);
        assert_eq!(t.progress, 50.0);
        assert!(!t.completed);

        toggle_sub_task(&mut t, &second, now).unwrap();
        assert_eq!(t.progress, 100.0);
        assert!(t.completed);

        toggle_sub_task(&mut t, &first, now).unwrap();
        assert_eq!(t.progress, 50.0);
        assert!(!t.completed);
    }

    #[test]
    fn toggle_sub_task_invariant_holds_for_every_step() {
        let mut t = task(&[false, true, false, true, false]);
        let ids: Vec<SubTaskId> = t.sub_tasks.iter().map(|s| s.id.clone()).collect();
        let now = Utc::now();
        for id in ids.iter().chain(ids.iter().rev()) {
            toggle_sub_task(&mut t, id, now).unwrap();
            let done = t.completed_count();
            let n = t.sub_tasks.len();
            assert!((t.progress - 100.0 * done as f64 / n as f64).abs() < 1e-9);
            assert_eq!(t.completed, done == n);
        }
    }

    #[test]
    fn toggle_unknown_sub_task_is_none() {
        let mut t = task(&[false]);
        assert!(toggle_sub_task(&mut t, &SubTaskId::from_raw("sub_x"), Utc::now()).is_none());
        assert!(!t.sub_tasks[0].completed);
    }

    #[test]
    fn adding_open_sub_task_reopens_completed_parent() {
        let mut t = task(&[true]);
        settle_from_sub_tasks(&mut t);
        assert!(t.completed);

        add_sub_task(&mut t, "more".into(), Utc::now());
        assert!(!t.completed);
        assert_eq!(t.progress, 50.0);
    }

    #[test]
    fn removing_last_open_sub_task_completes_parent() {
        let mut t = task(&[true, false]);
        let open = t.sub_tasks[1].id.clone();
        assert!(remove_sub_task(&mut t, &open, Utc::now()));
        assert!(t.completed);
        assert_eq!(t.progress, 100.0);
        assert!(!remove_sub_task(&mut t, &open, Utc::now()));
    }

    #[test]
    fn removing_every_sub_task_keeps_own_flag() {
        let mut t = task(&[false]);
        let only = t.sub_tasks[0].id.clone();
        remove_sub_task(&mut t, &only, Utc::now());
        assert!(!t.completed);
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn reconcile_keeps_matched_drops_missing_adds_new() {
        let mut t = task(&[true, false]);
        let kept = t.sub_tasks[0].id.clone();
        let dropped = t.sub_tasks[1].id.clone();

        let outcome = reconcile_sub_tasks(
            &mut t,
            &[input(Some(&kept), "s0"), input(None, "fresh")],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.removed, vec![dropped]);
        assert_eq!(t.sub_tasks.len(), 2);
        assert_eq!(t.sub_tasks[0].id, kept);
        assert!(t.sub_tasks[0].completed, "completion carried from storage");
        assert!(!t.sub_tasks[1].completed);
        assert_eq!(t.progress, 50.0);
    }

    #[test]
    fn reconcile_takes_title_but_not_completion_from_input() {
        let mut t = task(&[false]);
        let id = t.sub_tasks[0].id.clone();
        reconcile_sub_tasks(&mut t, &[input(Some(&id), "  renamed ")], Utc::now()).unwrap();
        assert_eq!(t.sub_tasks[0].title, "renamed");
        assert!(!t.sub_tasks[0].completed);
    }

    #[test]
    fn reconcile_ignores_foreign_and_duplicate_ids() {
        let mut t = task(&[false]);
        let id = t.sub_tasks[0].id.clone();
        let foreign = SubTaskId::from_raw("sub_elsewhere");

        let outcome = reconcile_sub_tasks(
            &mut t,
            &[input(Some(&id), "a"), input(Some(&id), "b"), input(Some(&foreign), "c")],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.ignored, vec![id.clone(), foreign]);
        assert_eq!(t.sub_tasks.len(), 1);
        assert_eq!(t.sub_tasks[0].title, "a");
    }

    #[test]
    fn reconcile_does_not_recompute_completion() {
        let mut t = task(&[true]);
        t.completed = true;
        reconcile_sub_tasks(&mut t, &[input(None, "new")], Utc::now()).unwrap();
        assert!(t.completed);
        assert_eq!(t.progress, 0.0);
    }

    #[test]
    fn reconcile_rejects_blank_titles_without_mutating() {
        let mut t = task(&[false]);
        let before = t.clone();
        let err = reconcile_sub_tasks(&mut t, &[input(None, " ")], Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(t, before);
    }
}
