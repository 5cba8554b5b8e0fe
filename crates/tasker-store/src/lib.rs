pub mod database;
pub mod error;
pub mod revocations;
pub mod row_helpers;
pub mod schema;
pub mod tasks;
pub mod users;

pub use database::Database;
pub use error::StoreError;
pub use revocations::{RevocationRepo, RevocationStore};
pub use tasks::{TaskEdit, TaskRepo, TaskStore};
pub use users::{UserRepo, UserStore};
