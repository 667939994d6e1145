//! The conditional-transition primitive.
//!
//! Both core components change state exclusively through the two operations
//! here. Each is one atomic statement against the database, so among any set
//! of concurrent callers targeting the same key exactly one observes
//! [`Transition::Applied`]; the rest observe [`Transition::Conflict`] or
//! [`Transition::NotFound`]. No partial write is ever visible.

use rusqlite::{Connection, ToSql};

use crate::error::StoreError;

/// Outcome of a conditional state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This caller won: the row matched the expected state and was updated.
    Applied,
    /// A row exists for the key but its state failed the predicate — someone
    /// else already transitioned it.
    Conflict,
    /// No row matches the key.
    NotFound,
}

/// Run an `UPDATE` whose `WHERE` clause carries the expected-state predicate.
///
/// Zero affected rows is disambiguated with `probe_sql`, a `SELECT COUNT(*)`
/// over the key alone: a surviving row means the predicate failed
/// (`Conflict`), no row means the key is unknown (`NotFound`). The probe is
/// diagnostic only; the atomic part has already happened.
pub(crate) fn conditional_update(
    conn: &Connection,
    update_sql: &str,
    update_params: &[&dyn ToSql],
    probe_sql: &str,
    probe_params: &[&dyn ToSql],
) -> Result<Transition, StoreError> {
    let affected = conn.execute(update_sql, update_params)?;
    if affected > 0 {
        return Ok(Transition::Applied);
    }
    let present: i64 = conn.query_row(probe_sql, probe_params, |row| row.get(0))?;
    if present > 0 {
        Ok(Transition::Conflict)
    } else {
        Ok(Transition::NotFound)
    }
}

/// Run an `INSERT` whose expected state ("no active/inside row for this key")
/// is enforced by a partial unique index: the insert itself is the
/// compare-and-set. A constraint violation is the losing side of the race.
pub(crate) fn guarded_insert(
    conn: &Connection,
    insert_sql: &str,
    params: &[&dyn ToSql],
) -> Result<Transition, StoreError> {
    match conn.execute(insert_sql, params) {
        Ok(_) => Ok(Transition::Applied),
        Err(rusqlite::Error::SqliteFailure(e, message))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::debug!(
                constraint = message.as_deref().unwrap_or("unknown"),
                "guarded insert lost to an existing row"
            );
            Ok(Transition::Conflict)
        }
        Err(e) => Err(e.into()),
    }
}
