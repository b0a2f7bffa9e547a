//! SQLite-backed persistence.
//!
//! Every operation opens its own connection so concurrent requests are
//! isolated by SQLite's locking rather than by an in-process lock. Writes go
//! through [`UnitOfWork`].
//!
//! A store handle may carry a deadline. Lock waits never outlast it, and a
//! unit that reaches commit after it has passed rolls back and reports
//! `TripError::Timeout`, so a timed-out write never takes effect.

mod expenses;
mod groups;
mod schema;
mod unit;
mod users;
mod votings;

pub(crate) use groups::authorize_member;
pub use unit::UnitOfWork;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, TripError};

/// Handle to the relational store.
///
/// Cheap to clone; holds only the location and connection settings.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
    deadline: Option<Instant>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            path,
            busy_timeout,
            deadline: None,
        };
        let conn = store.connect()?;
        // WAL lets readers proceed while a writer holds the lock.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        schema::apply(&conn)?;

        info!(path = %store.path.display(), journal_mode = %mode, "Store opened");
        Ok(store)
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::open(
            &config.database_path,
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle whose operations must finish by `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when the handle has none.
    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Open a fresh connection with foreign keys enforced.
    ///
    /// Lock waits are capped by the remaining deadline.
    pub(crate) fn connect(&self) -> Result<Connection> {
        let busy_timeout = match self.remaining() {
            Some(Duration::ZERO) => return Err(TripError::Timeout),
            Some(left) => left.min(self.busy_timeout),
            None => self.busy_timeout,
        };
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Under a deadline, lock waits are capped by it; report them as a timeout.
    fn expire(&self, err: TripError) -> TripError {
        let busy = matches!(
            &err,
            TripError::Storage(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        if busy && self.deadline.is_some() {
            debug!("Lock wait ran past the request deadline");
            TripError::Timeout
        } else {
            err
        }
    }

    /// Run `work` as one atomic unit.
    ///
    /// The unit commits only if `work` returns `Ok` before the deadline; any
    /// other outcome rolls back every row it wrote.
    pub fn write<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.expire(e.into()))?;
        UnitOfWork::new(tx)
            .run(self.deadline, work)
            .map_err(|e| self.expire(e))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::{NewGroup, TravelGroup, User};
    use chrono::NaiveDate;

    /// A store in a temporary directory that lives as long as the guard.
    pub struct TestStore {
        pub store: Store,
        _dir: tempfile::TempDir,
    }

    impl std::ops::Deref for TestStore {
        type Target = Store;

        fn deref(&self) -> &Store {
            &self.store
        }
    }

    pub fn test_store() -> TestStore {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db"), Duration::from_secs(5)).unwrap();
        TestStore { store, _dir: dir }
    }

    pub fn user(store: &Store, name: &str) -> User {
        store
            .create_user(name, &format!("{}@example.com", name.to_lowercase()))
            .unwrap()
    }

    pub fn group(store: &Store, creator: &User, name: &str) -> TravelGroup {
        let new = NewGroup::new(
            creator.id,
            name,
            "",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        )
        .unwrap();
        store.create_group(&new).unwrap()
    }

    /// Count rows of `table`, optionally filtered by a `WHERE` clause.
    pub fn count(store: &Store, table: &str, filter: &str) -> i64 {
        let conn = store.connect().unwrap();
        let sql = if filter.is_empty() {
            format!("SELECT COUNT(*) FROM {}", table)
        } else {
            format!("SELECT COUNT(*) FROM {} WHERE {}", table, filter)
        };
        conn.query_row(&sql, [], |row| row.get(0)).unwrap()
    }

    /// Install a trigger that aborts inserts into `table` when `condition` holds.
    pub fn fail_inserts(store: &Store, table: &str, condition: &str) {
        let conn = store.connect().unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER injected_failure BEFORE INSERT ON {table}
             WHEN {condition}
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        ))
        .unwrap();
    }
}
