// src/memory.rs
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Agenda, Vote, VoteOption, VotingSession};
use crate::repository::{
    AgendaRepository, SessionRepository, StoreError, VoteRepository, SESSION_AGENDA_UNIQUE,
    VOTE_AGENDA_VOTER_UNIQUE,
};

#[derive(Default)]
struct Tables {
    // insertion order is kept, list tie-breaks depend on it
    agendas: Vec<Agenda>,
    sessions: Vec<VotingSession>,
    votes: Vec<Vote>,
}

/// Process-local store enforcing the same uniqueness constraints as the
/// Postgres schema. Every operation holds the lock for its whole check-and-write,
/// which is what makes the constraints hold under concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Corrupt {
            table: "memory",
            detail: "store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl AgendaRepository for MemoryStore {
    async fn insert_agenda(&self, agenda: &Agenda) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.agendas.iter().any(|a| a.id == agenda.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "agendas_pkey".to_string(),
            });
        }
        tables.agendas.push(agenda.clone());
        Ok(())
    }

    async fn find_agenda(&self, id: Uuid) -> Result<Option<Agenda>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.agendas.iter().find(|a| a.id == id).cloned())
    }

    async fn list_agendas(&self) -> Result<Vec<Agenda>, StoreError> {
        let mut agendas = self.lock()?.agendas.clone();
        // sort_by is stable
        agendas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agendas)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert_session(&self, session: &VotingSession) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables
            .sessions
            .iter()
            .any(|s| s.agenda_id == session.agenda_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: SESSION_AGENDA_UNIQUE.to_string(),
            });
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn insert_session_or_fetch(
        &self,
        session: &VotingSession,
    ) -> Result<VotingSession, StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables
            .sessions
            .iter()
            .find(|s| s.agenda_id == session.agenda_id)
        {
            return Ok(existing.clone());
        }
        tables.sessions.push(session.clone());
        Ok(session.clone())
    }

    async fn find_session_by_agenda(
        &self,
        agenda_id: Uuid,
    ) -> Result<Option<VotingSession>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.agenda_id == agenda_id)
            .cloned())
    }
}

#[async_trait]
impl VoteRepository for MemoryStore {
    async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables
            .votes
            .iter()
            .any(|v| v.agenda_id == vote.agenda_id && v.voter_identifier == vote.voter_identifier)
        {
            return Err(StoreError::UniqueViolation {
                constraint: VOTE_AGENDA_VOTER_UNIQUE.to_string(),
            });
        }
        tables.votes.push(vote.clone());
        Ok(())
    }

    async fn vote_exists(
        &self,
        agenda_id: Uuid,
        voter_identifier: &str,
    ) -> Result<bool, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .votes
            .iter()
            .any(|v| v.agenda_id == agenda_id && v.voter_identifier == voter_identifier))
    }

    async fn count_votes_by_option(
        &self,
        agenda_id: Uuid,
    ) -> Result<Vec<(VoteOption, i64)>, StoreError> {
        let tables = self.lock()?;
        let mut counts: Vec<(VoteOption, i64)> = Vec::new();
        for vote in tables.votes.iter().filter(|v| v.agenda_id == agenda_id) {
            match counts.iter_mut().find(|(option, _)| *option == vote.option) {
                Some((_, count)) => *count += 1,
                None => counts.push((vote.option, 1)),
            }
        }
        Ok(counts)
    }
}
