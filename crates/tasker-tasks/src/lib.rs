//! # tasker-tasks
//!
//! Task aggregate manager: keeps a task's `completed`, `progress` and
//! `overdue` fields consistent with its sub-tasks.
//!
//! - [`aggregate`] holds the pure rules (no I/O, "now" passed in).
//! - [`service::TaskService`] loads aggregates from a [`TaskStore`],
//!   applies the rules, enforces ownership and persists the result.
//!
//! [`TaskStore`]: tasker_store::TaskStore

pub mod aggregate;
pub mod filter;
pub mod service;
pub mod types;

pub use filter::{TaskCategory, TaskFilter, TaskListing};
pub use service::TaskService;
pub use types::{NewSubTask, NewTask, SubTaskInput, TaskUpdate};
