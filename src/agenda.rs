// src/agenda.rs
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{
    Agenda, CreateAgendaRequest, ResultsSummary, VotingSession, DESCRIPTION_MAX_CHARS,
    TITLE_MAX_CHARS,
};
use crate::repository::{AgendaRepository, SessionRepository, SharedStore};
use crate::session;

#[derive(Clone)]
pub struct AgendaService {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl AgendaService {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Agenda, AppError> {
        let agenda = Agenda {
            id: Uuid::new_v4(),
            title: title.trim().to_string(),
            description: description.map(|d| d.trim().to_string()),
            created_at: self.clock.now(),
        };
        self.store.insert_agenda(&agenda).await?;
        info!(agenda_id = %agenda.id, title = %agenda.title, "agenda created");
        Ok(agenda)
    }

    pub async fn list(&self) -> Result<Vec<Agenda>, AppError> {
        Ok(self.store.list_agendas().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Agenda, AppError> {
        self.store
            .find_agenda(id)
            .await?
            .ok_or_else(|| AppError::not_found("agenda not found"))
    }

    /// Opens the agenda's one and only session. A session that is still open
    /// is rejected up front; any other existing session trips the per-agenda
    /// uniqueness constraint on insert, so a lapsed session is never reopened.
    pub async fn open_session(
        &self,
        agenda_id: Uuid,
        duration_minutes: Option<i64>,
    ) -> Result<VotingSession, AppError> {
        self.get(agenda_id).await?;
        let now = self.clock.now();

        if let Some(existing) = self.store.find_session_by_agenda(agenda_id).await? {
            if existing.is_open_at(now) {
                return Err(AppError::conflict("voting session already open"));
            }
        }

        let session = session::new_session(agenda_id, now, duration_minutes)?;
        self.store.insert_session(&session).await?;
        info!(
            %agenda_id,
            session_id = %session.id,
            duration_seconds = session.duration_seconds,
            closes_at = %session.closes_at,
            "voting session opened"
        );
        Ok(session)
    }

    pub async fn results(&self, agenda_id: Uuid) -> Result<ResultsSummary, AppError> {
        self.get(agenda_id).await?;
        session::summarize(self.store.as_ref(), agenda_id, self.clock.now()).await
    }
}

impl CreateAgendaRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(AppError::Validation(format!(
                "title must be at most {TITLE_MAX_CHARS} characters"
            )));
        }
        if let Some(description) = &self.description {
            if description.trim().chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(AppError::Validation(format!(
                    "description must be at most {DESCRIPTION_MAX_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}
