//! The access-control database: guard sessions, presence records, and the
//! person reference table.
//!
//! Every state change goes through the conditional-transition primitive in
//! [`crate::transition`]; reads are plain snapshots. The connection lives
//! behind a mutex so one store can be shared across request threads, but the
//! invariants do not depend on that mutex — they are carried by the schema's
//! partial unique indexes and hold across independent processes opening the
//! same file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use warden_types::{
    Affiliation, CheckpointId, DeviceInfo, GuardId, GuardSession, PersonId, PersonProfile,
    PresenceRecord, SessionToken,
};

use crate::error::StoreError;
use crate::fs_util::prepare_db_path;
use crate::time::{from_millis, from_millis_opt, to_millis};
use crate::transition::{self, Transition};

/// Result of attempting to claim a checkpoint for a new guard session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The session row was inserted; the caller's session now owns the
    /// checkpoint.
    Claimed,
    /// Another guard's active session owns the checkpoint. The refused
    /// guard's own prior sessions are left untouched.
    Occupied(GuardSession),
}

const SESSION_COLS: &str =
    "token, guard_id, guard_name, checkpoint_id, device_json, started_at, last_activity, \
     active, ended_at";

const PRESENCE_COLS: &str =
    "person_id, person_name, faculty, school, entered_at, exited_at, entry_checkpoint, \
     exit_checkpoint, entry_guard, exit_guard, inside, dwell_ms";

/// SQLite-backed store for the access-control core.
pub struct AccessStore {
    conn: Mutex<Connection>,
}

impl AccessStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS guard_sessions (
            token TEXT PRIMARY KEY,
            guard_id TEXT NOT NULL,
            guard_name TEXT NOT NULL,
            checkpoint_id TEXT NOT NULL,
            device_json TEXT NOT NULL DEFAULT 'null',
            started_at INTEGER NOT NULL,
            last_activity INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            ended_at INTEGER
        );

        -- One active session per checkpoint: the insert is the compare-and-set.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_sole_owner
        ON guard_sessions(checkpoint_id) WHERE active = 1;

        CREATE INDEX IF NOT EXISTS idx_sessions_guard
        ON guard_sessions(guard_id, active);

        CREATE TABLE IF NOT EXISTS presence (
            id INTEGER PRIMARY KEY,
            person_id TEXT NOT NULL,
            person_name TEXT NOT NULL,
            faculty TEXT NOT NULL,
            school TEXT NOT NULL,
            entered_at INTEGER NOT NULL,
            exited_at INTEGER,
            entry_checkpoint TEXT NOT NULL,
            exit_checkpoint TEXT,
            entry_guard TEXT NOT NULL,
            exit_guard TEXT,
            inside INTEGER NOT NULL DEFAULT 1,
            dwell_ms INTEGER
        );

        -- One inside record per person.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_presence_sole_inside
        ON presence(person_id) WHERE inside = 1;

        CREATE INDEX IF NOT EXISTS idx_presence_person
        ON presence(person_id, entered_at);

        CREATE TABLE IF NOT EXISTS people (
            person_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            faculty TEXT NOT NULL,
            school TEXT NOT NULL,
            enrolled INTEGER NOT NULL DEFAULT 1
        );
    ";

    /// Open or create the database at the given path, with owner-only file
    /// permissions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        prepare_db_path(path)?;
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory store (tests and fixtures).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── Guard sessions ──────────────────────────────────────────────────

    /// Claim `session.checkpoint_id` for a fully built new session.
    ///
    /// Runs as one transaction: the guard's own active sessions (any
    /// checkpoint) are closed first, then the insert races against the
    /// sole-owner index. A lost race rolls the whole transaction back, so a
    /// refused claim leaves the guard's previous session in place.
    pub fn claim_checkpoint(&self, session: &GuardSession) -> Result<ClaimOutcome, StoreError> {
        let device_json = serde_json::to_string(session.device.as_value())
            .map_err(|e| StoreError::Corrupt(format!("device payload: {e}")))?;
        let now_ms = to_millis(session.started_at);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let closed = tx.execute(
            "UPDATE guard_sessions SET active = 0, ended_at = ?1
             WHERE guard_id = ?2 AND active = 1",
            params![now_ms, session.guard_id.as_str()],
        )?;
        if closed > 0 {
            tracing::debug!(
                guard_id = session.guard_id.as_str(),
                closed,
                "closed prior sessions before new claim"
            );
        }

        let inserted = transition::guarded_insert(
            &tx,
            "INSERT INTO guard_sessions
             (token, guard_id, guard_name, checkpoint_id, device_json, started_at, \
              last_activity, active, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, NULL)",
            params![
                session.token.as_str(),
                session.guard_id.as_str(),
                session.guard_name,
                session.checkpoint_id.as_str(),
                device_json,
                now_ms,
                to_millis(session.last_activity),
            ],
        )?;

        match inserted {
            Transition::Applied => {
                tx.commit()?;
                Ok(ClaimOutcome::Claimed)
            }
            Transition::Conflict | Transition::NotFound => {
                let owner = active_session_at(&tx, session.checkpoint_id.as_str())?;
                drop(tx);
                match owner {
                    Some(owner) => Ok(ClaimOutcome::Occupied(owner)),
                    None => Err(StoreError::Corrupt(
                        "checkpoint claim conflicted but no active owner row exists".to_string(),
                    )),
                }
            }
        }
    }

    /// Refresh `last_activity` for an active session.
    pub fn touch_session(
        &self,
        token: &SessionToken,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        let conn = self.lock()?;
        transition::conditional_update(
            &conn,
            "UPDATE guard_sessions SET last_activity = ?1 WHERE token = ?2 AND active = 1",
            params![to_millis(at), token.as_str()],
            "SELECT COUNT(*) FROM guard_sessions WHERE token = ?1",
            params![token.as_str()],
        )
    }

    /// Close an active session, stamping its end time.
    pub fn close_session(
        &self,
        token: &SessionToken,
        at: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        let conn = self.lock()?;
        transition::conditional_update(
            &conn,
            "UPDATE guard_sessions SET active = 0, ended_at = ?1
             WHERE token = ?2 AND active = 1",
            params![to_millis(at), token.as_str()],
            "SELECT COUNT(*) FROM guard_sessions WHERE token = ?1",
            params![token.as_str()],
        )
    }

    /// Close every active session belonging to a guard; returns how many
    /// were closed.
    pub fn close_sessions_for_guard(
        &self,
        guard_id: &GuardId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let closed = conn.execute(
            "UPDATE guard_sessions SET active = 0, ended_at = ?1
             WHERE guard_id = ?2 AND active = 1",
            params![to_millis(at), guard_id.as_str()],
        )?;
        Ok(closed)
    }

    /// Snapshot of all active sessions.
    pub fn active_sessions(&self) -> Result<Vec<GuardSession>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM guard_sessions WHERE active = 1 ORDER BY started_at"
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(build_session(row?)?);
        }
        Ok(sessions)
    }

    /// Active sessions whose `last_activity` is at or before `cutoff`.
    pub fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<GuardSession>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM guard_sessions
             WHERE active = 1 AND last_activity <= ?1
             ORDER BY last_activity"
        ))?;
        let rows = stmt.query_map(params![to_millis(cutoff)], session_from_row)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(build_session(row?)?);
        }
        Ok(sessions)
    }

    /// Fetch a session by token, active or not.
    pub fn session_by_token(
        &self,
        token: &SessionToken,
    ) -> Result<Option<GuardSession>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {SESSION_COLS} FROM guard_sessions WHERE token = ?1"),
                params![token.as_str()],
                session_from_row,
            )
            .optional()?;
        raw.map(build_session).transpose()
    }

    /// Delete a session row outright (administrative purge). Returns whether
    /// a row existed.
    pub fn delete_session(&self, token: &SessionToken) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM guard_sessions WHERE token = ?1",
            params![token.as_str()],
        )?;
        Ok(deleted > 0)
    }

    // ── Presence ────────────────────────────────────────────────────────

    /// Insert a fully built inside record; the sole-inside index is the
    /// expected-state predicate.
    pub fn open_presence(&self, record: &PresenceRecord) -> Result<Transition, StoreError> {
        let conn = self.lock()?;
        transition::guarded_insert(
            &conn,
            "INSERT INTO presence
             (person_id, person_name, faculty, school, entered_at, exited_at, \
              entry_checkpoint, exit_checkpoint, entry_guard, exit_guard, inside, dwell_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL, ?7, NULL, 1, NULL)",
            params![
                record.person_id.as_str(),
                record.person_name,
                record.affiliation.faculty,
                record.affiliation.school,
                to_millis(record.entered_at),
                record.entry_checkpoint.as_str(),
                record.entry_guard.as_str(),
            ],
        )
    }

    /// Close a person's inside record, stamping the exit side and computing
    /// dwell in the same statement. Dwell is clamped at zero against clock
    /// skew between checkpoint devices.
    ///
    /// Returns the closed record, or `None` when the person has no inside
    /// record (never entered, or already exited).
    pub fn close_presence(
        &self,
        person_id: &PersonId,
        exit_checkpoint: &CheckpointId,
        exit_guard: &GuardId,
        at: DateTime<Utc>,
    ) -> Result<Option<PresenceRecord>, StoreError> {
        let conn = self.lock()?;
        let outcome = transition::conditional_update(
            &conn,
            "UPDATE presence SET exited_at = ?1, exit_checkpoint = ?2, exit_guard = ?3,
                 inside = 0, dwell_ms = MAX(0, ?1 - entered_at)
             WHERE person_id = ?4 AND inside = 1",
            params![
                to_millis(at),
                exit_checkpoint.as_str(),
                exit_guard.as_str(),
                person_id.as_str(),
            ],
            "SELECT COUNT(*) FROM presence WHERE person_id = ?1",
            params![person_id.as_str()],
        )?;

        match outcome {
            Transition::Applied => {
                let raw = conn
                    .query_row(
                        &format!(
                            "SELECT {PRESENCE_COLS} FROM presence
                             WHERE person_id = ?1 AND inside = 0
                             ORDER BY id DESC LIMIT 1"
                        ),
                        params![person_id.as_str()],
                        presence_from_row,
                    )
                    .optional()?;
                raw.map(build_presence).transpose()
            }
            Transition::Conflict | Transition::NotFound => {
                tracing::debug!(
                    person_id = person_id.as_str(),
                    ?outcome,
                    "exit refused: no inside record"
                );
                Ok(None)
            }
        }
    }

    /// The person's current inside record, if any.
    pub fn inside_record(
        &self,
        person_id: &PersonId,
    ) -> Result<Option<PresenceRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {PRESENCE_COLS} FROM presence WHERE person_id = ?1 AND inside = 1"
                ),
                params![person_id.as_str()],
                presence_from_row,
            )
            .optional()?;
        raw.map(build_presence).transpose()
    }

    /// Snapshot of everyone currently inside, oldest entry first.
    pub fn inside_records(&self) -> Result<Vec<PresenceRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRESENCE_COLS} FROM presence WHERE inside = 1 ORDER BY entered_at"
        ))?;
        let rows = stmt.query_map([], presence_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(build_presence(row?)?);
        }
        Ok(records)
    }

    /// Inside records whose entry time is at or before `cutoff`.
    pub fn overdue_records(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PRESENCE_COLS} FROM presence
             WHERE inside = 1 AND entered_at <= ?1
             ORDER BY entered_at"
        ))?;
        let rows = stmt.query_map(params![to_millis(cutoff)], presence_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(build_presence(row?)?);
        }
        Ok(records)
    }

    // ── People reference table ──────────────────────────────────────────

    /// Insert or update a person's reference data.
    pub fn upsert_person(&self, profile: &PersonProfile) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO people (person_id, name, faculty, school, enrolled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(person_id) DO UPDATE SET
                 name = excluded.name,
                 faculty = excluded.faculty,
                 school = excluded.school,
                 enrolled = excluded.enrolled",
            params![
                profile.id.as_str(),
                profile.name,
                profile.affiliation.faculty,
                profile.affiliation.school,
                i64::from(profile.enrolled),
            ],
        )?;
        Ok(())
    }

    /// Look up a person's reference data.
    pub fn find_person(&self, person_id: &PersonId) -> Result<Option<PersonProfile>, StoreError> {
        let conn = self.lock()?;
        let profile = conn
            .query_row(
                "SELECT person_id, name, faculty, school, enrolled
                 FROM people WHERE person_id = ?1",
                params![person_id.as_str()],
                |row| {
                    Ok(PersonProfile {
                        id: PersonId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        affiliation: Affiliation {
                            faculty: row.get(2)?,
                            school: row.get(3)?,
                        },
                        enrolled: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────
//
// Closures handed to rusqlite must return `rusqlite::Result`, so rows come
// out as primitive tuples and are converted to domain types outside the
// query (timestamp and payload parsing can fail with `StoreError`).

type SessionRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    i64,
    i64,
    Option<i64>,
);

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn build_session(raw: SessionRow) -> Result<GuardSession, StoreError> {
    let (token, guard_id, guard_name, checkpoint_id, device_json, started, activity, active, ended) =
        raw;
    let device = serde_json::from_str(&device_json)
        .map_err(|e| StoreError::Corrupt(format!("device payload: {e}")))?;
    Ok(GuardSession {
        token: SessionToken::new(token),
        guard_id: GuardId::new(guard_id),
        guard_name,
        checkpoint_id: CheckpointId::new(checkpoint_id),
        device: DeviceInfo(device),
        started_at: from_millis(started)?,
        last_activity: from_millis(activity)?,
        active: active != 0,
        ended_at: from_millis_opt(ended)?,
    })
}

type PresenceRow = (
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
    String,
    Option<String>,
    String,
    Option<String>,
    i64,
    Option<i64>,
);

fn presence_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresenceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn build_presence(raw: PresenceRow) -> Result<PresenceRecord, StoreError> {
    let (
        person_id,
        person_name,
        faculty,
        school,
        entered,
        exited,
        entry_checkpoint,
        exit_checkpoint,
        entry_guard,
        exit_guard,
        inside,
        dwell_ms,
    ) = raw;
    Ok(PresenceRecord {
        person_id: PersonId::new(person_id),
        person_name,
        affiliation: Affiliation { faculty, school },
        entered_at: from_millis(entered)?,
        exited_at: from_millis_opt(exited)?,
        entry_checkpoint: CheckpointId::new(entry_checkpoint),
        exit_checkpoint: exit_checkpoint.map(CheckpointId::new),
        entry_guard: GuardId::new(entry_guard),
        exit_guard: exit_guard.map(GuardId::new),
        inside: inside != 0,
        dwell_ms,
    })
}

fn active_session_at(
    conn: &Connection,
    checkpoint_id: &str,
) -> Result<Option<GuardSession>, StoreError> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {SESSION_COLS} FROM guard_sessions
                 WHERE checkpoint_id = ?1 AND active = 1"
            ),
            params![checkpoint_id],
            session_from_row,
        )
        .optional()?;
    raw.map(build_session).transpose()
}
