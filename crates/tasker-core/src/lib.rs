pub mod errors;
pub mod ids;
pub mod model;

pub use errors::ServiceError;
pub use ids::{SubTaskId, TaskId, UserId};
pub use model::{SubTask, Task, User};
