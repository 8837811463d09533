// src/session.rs
//! Session lifecycle rules shared by the agenda and voting services.
//!
//! A session is open while its status is OPEN and the clock has not reached
//! `closes_at`. Nothing sweeps expired sessions; closure is observed lazily on read.

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ResultsSummary, SessionStatus, VoteOption, VotingSession};
use crate::repository::{SessionRepository, Store, VoteRepository};

pub const DEFAULT_DURATION_MINUTES: i64 = 60;
pub const MIN_DURATION_SECONDS: i64 = 60;

/// Omitted or non-positive minutes fall back to the default; the result is
/// floored at one minute.
pub fn resolve_duration_seconds(minutes: Option<i64>) -> i64 {
    let minutes = match minutes {
        Some(m) if m > 0 => m,
        _ => DEFAULT_DURATION_MINUTES,
    };
    minutes.saturating_mul(60).max(MIN_DURATION_SECONDS)
}

/// Builds a fresh OPEN session starting at `now`.
pub fn new_session(
    agenda_id: Uuid,
    now: DateTime<Utc>,
    minutes: Option<i64>,
) -> Result<VotingSession, AppError> {
    let duration_seconds = resolve_duration_seconds(minutes);
    let closes_at = TimeDelta::try_seconds(duration_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| AppError::unprocessable("session duration out of range"))?;

    Ok(VotingSession {
        id: Uuid::new_v4(),
        agenda_id,
        opened_at: now,
        duration_seconds,
        closes_at,
        status: SessionStatus::Open,
    })
}

/// Tally for an agenda that is known to exist. A missing session reads as CLOSED.
pub async fn summarize(
    store: &dyn Store,
    agenda_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ResultsSummary, AppError> {
    let (mut yes, mut no) = (0, 0);
    for (option, count) in store.count_votes_by_option(agenda_id).await? {
        match option {
            VoteOption::Yes => yes = count,
            VoteOption::No => no = count,
        }
    }

    let status = store
        .find_session_by_agenda(agenda_id)
        .await?
        .map(|session| session.observed_status(now))
        .unwrap_or(SessionStatus::Closed);

    Ok(ResultsSummary {
        yes,
        no,
        total: yes + no,
        status,
    })
}
