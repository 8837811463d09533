// src/repository.rs
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Agenda, VoteOption, Vote, VotingSession};

/// At most one session row per agenda.
pub const SESSION_AGENDA_UNIQUE: &str = "uk_session_agenda";
/// At most one vote per (agenda, voter identifier).
pub const VOTE_AGENDA_VOTER_UNIQUE: &str = "uk_vote_agenda_voter";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },

    #[error("corrupt row in `{table}`: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AgendaRepository: Send + Sync {
    async fn insert_agenda(&self, agenda: &Agenda) -> Result<(), StoreError>;

    async fn find_agenda(&self, id: Uuid) -> Result<Option<Agenda>, StoreError>;

    /// Newest first; agendas sharing a timestamp keep insertion order.
    async fn list_agendas(&self) -> Result<Vec<Agenda>, StoreError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fails with [`StoreError::UniqueViolation`] on [`SESSION_AGENDA_UNIQUE`]
    /// when the agenda already has a session.
    async fn insert_session(&self, session: &VotingSession) -> Result<(), StoreError>;

    /// Inserts `session` unless the agenda already has one, and returns the
    /// session of record either way. Concurrent callers converge on one row.
    async fn insert_session_or_fetch(
        &self,
        session: &VotingSession,
    ) -> Result<VotingSession, StoreError>;

    async fn find_session_by_agenda(
        &self,
        agenda_id: Uuid,
    ) -> Result<Option<VotingSession>, StoreError>;
}

#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Fails with [`StoreError::UniqueViolation`] on [`VOTE_AGENDA_VOTER_UNIQUE`]
    /// when the voter already voted on the agenda.
    async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError>;

    async fn vote_exists(&self, agenda_id: Uuid, voter_identifier: &str)
        -> Result<bool, StoreError>;

    /// Options nobody chose are absent from the result.
    async fn count_votes_by_option(
        &self,
        agenda_id: Uuid,
    ) -> Result<Vec<(VoteOption, i64)>, StoreError>;
}

pub trait Store: AgendaRepository + SessionRepository + VoteRepository {}

impl<T> Store for T where T: AgendaRepository + SessionRepository + VoteRepository {}

pub type SharedStore = Arc<dyn Store>;
