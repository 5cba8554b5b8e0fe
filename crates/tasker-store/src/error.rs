use tasker_core::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    /// An edit applied inside a transaction refused the loaded aggregate.
    #[error("edit rejected: {0}")]
    Rejected(ServiceError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Conflict(e.to_string());
            }
        }
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(what) => ServiceError::Conflict(what),
            StoreError::Rejected(err) => err,
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_service_taxonomy() {
        let nf: ServiceError = StoreError::NotFound("task x".into()).into();
        assert!(matches!(nf, ServiceError::NotFound(_)));

        let conflict: ServiceError = StoreError::Conflict("users.username".into()).into();
        assert!(matches!(conflict, ServiceError::Conflict(_)));

        let db: ServiceError = StoreError::Database("locked".into()).into();
        assert_eq!(db.status_code(), 500);

        let rejected: ServiceError =
            StoreError::Rejected(ServiceError::validation("title must not be empty")).into();
        assert_eq!(rejected, ServiceError::validation("title must not be empty"));
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: StoreError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }
}
