use tasker_core::model::Task;

/// Which partition of a user's tasks to return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Ongoing,
    Completed,
    Overdue,
}

impl TaskFilter {
    /// Parse the `filter` query value. Absent or unrecognised values select all tasks.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("ongoing") => Self::Ongoing,
            Some("completed") => Self::Completed,
            Some("overdue") => Self::Overdue,
            _ => Self::All,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::All => "List of all tasks",
            Self::Ongoing => "List of ongoing tasks",
            Self::Completed => "List of completed tasks",
            Self::Overdue => "List of overdue tasks",
        }
    }

    fn admits(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Ongoing => TaskCategory::of(task) == TaskCategory::Ongoing,
            Self::Completed => TaskCategory::of(task) == TaskCategory::Completed,
            Self::Overdue => TaskCategory::of(task) == TaskCategory::Overdue,
        }
    }
}

/// The partition a task falls in. Completed wins over overdue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskCategory {
    Ongoing,
    Completed,
    Overdue,
}

impl TaskCategory {
    /// Categorise a task whose derived fields are already refreshed.
    pub fn of(task: &Task) -> Self {
        if task.completed {
            Self::Completed
        } else if task.overdue {
            Self::Overdue
        } else {
            Self::Ongoing
        }
    }
}

/// Result of a list call.
#[derive(Clone, Debug)]
pub struct TaskListing {
    pub filter: TaskFilter,
    pub tasks: Vec<Task>,
}

impl TaskListing {
    /// Keep the tasks admitted by `filter`, preserving storage order.
    pub fn select(filter: TaskFilter, tasks: Vec<Task>) -> Self {
        let tasks = tasks.into_iter().filter(|t| filter.admits(t)).collect();
        Self { filter, tasks }
    }

    pub fn message(&self) -> &'static str {
        self.filter.message()
    }
}
