//! Scoped all-or-nothing write unit.

use std::time::Instant;

use rusqlite::{Connection, DropBehavior, Transaction};
use tracing::{debug, error, trace};

use crate::error::{Result, TripError};

/// An open write transaction.
///
/// Rows written through [`UnitOfWork::conn`] become visible only when the
/// unit commits. The unit is consumed by `run`, which either commits or
/// explicitly rolls back, including when the deadline passed while `work`
/// ran. The drop behaviour is pinned to rollback so an unwinding panic cannot
/// leave the transaction half-applied.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(crate) fn new(mut tx: Transaction<'conn>) -> Self {
        tx.set_drop_behavior(DropBehavior::Rollback);
        Self { tx }
    }

    /// Connection to issue statements on inside this unit.
    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    /// Id generated by the most recent insert in this unit.
    pub fn last_insert_id(&self) -> i64 {
        self.tx.last_insert_rowid()
    }

    pub(crate) fn run<T, F>(self, deadline: Option<Instant>, work: F) -> Result<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T>,
    {
        let outcome = match work(&self) {
            Ok(_) if deadline.is_some_and(|d| Instant::now() >= d) => {
                debug!("Deadline passed before commit");
                Err(TripError::Timeout)
            }
            other => other,
        };

        match outcome {
            Ok(value) => {
                self.tx.commit()?;
                trace!("Unit of work committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.tx.rollback() {
                    error!(error = %rollback_err, "Rollback failed");
                }
                trace!(error = %err, "Unit of work rolled back");
                Err(err)
            }
        }
    }
}
