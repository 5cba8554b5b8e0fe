use chrono::Utc;
use tracing::instrument;

use tasker_core::ids::UserId;
use tasker_core::model::User;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Credential storage consumed by the session gate.
pub trait UserStore: Send + Sync {
    /// Insert a new user. Fails with `StoreError::Conflict` when the username is taken.
    fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;

    fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl UserStore for UserRepo {
    #[instrument(skip(self, password_hash))]
    fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User {
            id: UserId::new(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    user.id.as_str(),
                    user.username,
                    user.password_hash,
                    row_helpers::format_time(&user.created_at),
                ],
            )
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => StoreError::Conflict(format!("username {username}")),
                other => other,
            })?;
            Ok(())
        })?;

        Ok(user)
    }

    #[instrument(skip(self))]
    fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
            )?;
            let mut rows = stmt.query([username])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_user(row)?)),
                None => Ok(None),
            }
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        username: row_helpers::get(row, 1, "users", "username")?,
        password_hash: row_helpers::get(row, 2, "users", "password_hash")?,
        created_at: row_helpers::get_time(row, 3, "users", "created_at")?,
    })
}
