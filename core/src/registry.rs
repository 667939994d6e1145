//! Checkpoint session registry.
//!
//! Owns the guard-session lifecycle and checkpoint exclusivity. The state
//! machine per checkpoint is `Unowned → Owned(guard) → Unowned`; the claim
//! itself is a conditional insert in the store, so among racing claims on
//! one checkpoint exactly one guard wins an ownership epoch and every loser
//! learns who is in control.
//!
//! There is no background expiry: a session stays active until its guard
//! closes it, the guard starts elsewhere, or an administrator forces it.
//! Staleness is a read-time judgment (`list_stale`).

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use warden_store::{AccessStore, ClaimOutcome, Transition};
use warden_types::{CheckpointId, DeviceInfo, GuardId, GuardSession, SessionToken};

use crate::errors::SessionError;

/// Evidence that the caller's administrative privilege was already verified.
///
/// The registry does not perform authorization; the façade checks the
/// requester's role against the external user service and only then
/// constructs the proof. Keeping it a distinct type (rather than a `bool`
/// argument) makes the unverified call path unrepresentable at a glance.
#[derive(Debug, Clone, Copy)]
pub struct AdminProof(());

impl AdminProof {
    /// Assert that administrative privilege has been verified upstream.
    #[must_use]
    pub fn verified() -> Self {
        Self(())
    }
}

/// Guard-session lifecycle and checkpoint exclusivity.
pub struct CheckpointRegistry {
    store: Arc<AccessStore>,
}

impl CheckpointRegistry {
    #[must_use]
    pub fn new(store: Arc<AccessStore>) -> Self {
        Self { store }
    }

    /// Start a session for `guard_id` at `checkpoint_id`.
    ///
    /// Any active session the guard holds elsewhere is closed first — a
    /// guard is present at one checkpoint at a time. If a *different* guard
    /// owns the checkpoint the claim fails with
    /// [`SessionError::CheckpointOccupied`] carrying that guard's identity,
    /// and the refused guard's prior session stays untouched.
    pub fn start_session(
        &self,
        guard_id: GuardId,
        guard_name: impl Into<String>,
        checkpoint_id: CheckpointId,
        device: DeviceInfo,
    ) -> Result<GuardSession, SessionError> {
        let now = Utc::now();
        let session = GuardSession {
            token: SessionToken::new(Uuid::new_v4().to_string()),
            guard_id,
            guard_name: guard_name.into(),
            checkpoint_id,
            device,
            started_at: now,
            last_activity: now,
            active: true,
            ended_at: None,
        };

        match self.store.claim_checkpoint(&session)? {
            ClaimOutcome::Claimed => {
                tracing::info!(
                    guard_id = session.guard_id.as_str(),
                    checkpoint_id = session.checkpoint_id.as_str(),
                    "guard session started"
                );
                Ok(session)
            }
            ClaimOutcome::Occupied(current) => {
                tracing::debug!(
                    guard_id = session.guard_id.as_str(),
                    checkpoint_id = session.checkpoint_id.as_str(),
                    owner = current.guard_id.as_str(),
                    "checkpoint claim refused"
                );
                Err(SessionError::CheckpointOccupied {
                    checkpoint_id: session.checkpoint_id,
                    owner: current.owner(),
                })
            }
        }
    }

    /// Refresh the session's last-activity time; returns the new value.
    ///
    /// Fails with [`SessionError::Expired`] when the token no longer names
    /// an active session.
    pub fn heartbeat(&self, token: &SessionToken) -> Result<DateTime<Utc>, SessionError> {
        let now = Utc::now();
        match self.store.touch_session(token, now)? {
            Transition::Applied => Ok(now),
            Transition::Conflict | Transition::NotFound => Err(SessionError::Expired),
        }
    }

    /// Close the session named by `token`.
    ///
    /// Idempotent failure mode: a retried or unknown close reports
    /// [`SessionError::NotFound`] and changes nothing.
    pub fn end_session(&self, token: &SessionToken) -> Result<(), SessionError> {
        match self.store.close_session(token, Utc::now())? {
            Transition::Applied => {
                tracing::info!(token = token.as_str(), "guard session ended");
                Ok(())
            }
            Transition::Conflict | Transition::NotFound => Err(SessionError::NotFound),
        }
    }

    /// Close every active session of `guard_id`, regardless of token
    /// possession; returns how many were closed.
    pub fn force_end_all(
        &self,
        guard_id: &GuardId,
        _admin: AdminProof,
    ) -> Result<usize, SessionError> {
        let closed = self.store.close_sessions_for_guard(guard_id, Utc::now())?;
        tracing::info!(
            guard_id = guard_id.as_str(),
            closed,
            "sessions force-ended by administrator"
        );
        Ok(closed)
    }

    /// Snapshot of all active sessions; no ordering guarantee beyond
    /// "active at time of read".
    pub fn list_active(&self) -> Result<Vec<GuardSession>, SessionError> {
        Ok(self.store.active_sessions()?)
    }

    /// Active sessions with no heartbeat for at least `max_idle`.
    ///
    /// Pure read-side filter; judging a session abandoned (and force-ending
    /// it) stays a caller policy.
    pub fn list_stale(&self, max_idle: TimeDelta) -> Result<Vec<GuardSession>, SessionError> {
        Ok(self.store.idle_sessions(Utc::now() - max_idle)?)
    }

    /// Confirm that `token` names the active session at `checkpoint_id`.
    ///
    /// The registry half of event handling: an access event is only valid
    /// when its session token is the current owner of the checkpoint it
    /// arrived from.
    pub fn validate_owner(
        &self,
        token: &SessionToken,
        checkpoint_id: &CheckpointId,
    ) -> Result<GuardSession, SessionError> {
        match self.store.session_by_token(token)? {
            Some(session) if session.active && session.checkpoint_id == *checkpoint_id => {
                Ok(session)
            }
            _ => Err(SessionError::Expired),
        }
    }

    /// Delete a session record outright. The only deletion path; everything
    /// else just flips the active flag.
    pub fn purge_session(
        &self,
        token: &SessionToken,
        _admin: AdminProof,
    ) -> Result<(), SessionError> {
        if self.store.delete_session(token)? {
            tracing::info!(token = token.as_str(), "session purged by administrator");
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }
}
