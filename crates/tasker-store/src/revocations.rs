use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Time-bounded list of revoked bearer tokens, keyed by token digest.
///
/// An entry only needs to outlive the token it blocks: once `expires_at`
/// has passed, signature validation rejects the token on its own.
pub trait RevocationStore: Send + Sync {
    /// Record a revoked token. Revoking the same digest twice is a no-op.
    fn revoke(&self, digest: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    fn is_revoked(&self, digest: &str) -> Result<bool, StoreError>;

    /// Drop entries whose token has expired by `now`. Returns the number removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

pub struct RevocationRepo {
    db: Database,
}

impl RevocationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl RevocationStore for RevocationRepo {
    #[instrument(skip(self, digest))]
    fn revoke(&self, digest: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO revoked_tokens (digest, expires_at, revoked_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    digest,
                    expires_at.timestamp(),
                    row_helpers::format_time(&Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    fn is_revoked(&self, digest: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM revoked_tokens WHERE digest = ?1",
                [digest],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    #[instrument(skip(self))]
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM revoked_tokens WHERE expires_at <= ?1",
                [now.timestamp()],
            )?)
        })?;
        if removed > 0 {
            debug!(removed, "purged expired revocations");
        }
        Ok(removed)
    }
}
