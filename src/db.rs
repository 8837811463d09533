// src/db.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Agenda, SessionStatus, Vote, VoteOption, VotingSession};
use crate::repository::{AgendaRepository, SessionRepository, StoreError, VoteRepository};

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let database_url = config.database_url.as_deref().unwrap_or_default();

    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Postgres-backed store; uniqueness is enforced by the schema's named constraints.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or_default().to_string(),
            };
        }
    }
    StoreError::Database(err)
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    agenda_id: Uuid,
    opened_at: DateTime<Utc>,
    duration_seconds: i64,
    closes_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<SessionRow> for VotingSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<SessionStatus>().map_err(|detail| StoreError::Corrupt {
            table: "voting_sessions",
            detail,
        })?;
        Ok(VotingSession {
            id: row.id,
            agenda_id: row.agenda_id,
            opened_at: row.opened_at,
            duration_seconds: row.duration_seconds,
            closes_at: row.closes_at,
            status,
        })
    }
}

const SESSION_COLUMNS: &str = "id, agenda_id, opened_at, duration_seconds, closes_at, status";

#[async_trait]
impl AgendaRepository for PgStore {
    async fn insert_agenda(&self, agenda: &Agenda) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agendas (id, title, description, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(agenda.id)
        .bind(&agenda.title)
        .bind(&agenda.description)
        .bind(agenda.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn find_agenda(&self, id: Uuid) -> Result<Option<Agenda>, StoreError> {
        sqlx::query_as::<_, Agenda>(
            "SELECT id, title, description, created_at FROM agendas WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn list_agendas(&self) -> Result<Vec<Agenda>, StoreError> {
        sqlx::query_as::<_, Agenda>(
            "SELECT id, title, description, created_at FROM agendas ORDER BY created_at DESC, seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert_session(&self, session: &VotingSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO voting_sessions (id, agenda_id, opened_at, duration_seconds, closes_at, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session.id)
        .bind(session.agenda_id)
        .bind(session.opened_at)
        .bind(session.duration_seconds)
        .bind(session.closes_at)
        .bind(session.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_session_or_fetch(
        &self,
        session: &VotingSession,
    ) -> Result<VotingSession, StoreError> {
        let inserted = sqlx::query_as::<_, SessionRow>(&format!(
            "INSERT INTO voting_sessions (id, agenda_id, opened_at, duration_seconds, closes_at, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (agenda_id) DO NOTHING
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session.id)
        .bind(session.agenda_id)
        .bind(session.opened_at)
        .bind(session.duration_seconds)
        .bind(session.closes_at)
        .bind(session.status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        if let Some(row) = inserted {
            return row.try_into();
        }

        // Lost the race: another writer's row is the session of record.
        self.find_session_by_agenda(session.agenda_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                table: "voting_sessions",
                detail: format!("conflicting session for agenda {} vanished", session.agenda_id),
            })
    }

    async fn find_session_by_agenda(
        &self,
        agenda_id: Uuid,
    ) -> Result<Option<VotingSession>, StoreError> {
        sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM voting_sessions WHERE agenda_id = $1"
        ))
        .bind(agenda_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .map(VotingSession::try_from)
        .transpose()
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;
        sqlx::query(
            "INSERT INTO votes (id, agenda_id, voter_identifier, vote_option, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(vote.id)
        .bind(vote.agenda_id)
        .bind(&vote.voter_identifier)
        .bind(vote.option.as_str())
        .bind(vote.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn vote_exists(
        &self,
        agenda_id: Uuid,
        voter_identifier: &str,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM votes WHERE agenda_id = $1 AND voter_identifier = $2) AS found",
        )
        .bind(agenda_id)
        .bind(voter_identifier)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(row.get::<bool, _>("found"))
    }

    async fn count_votes_by_option(
        &self,
        agenda_id: Uuid,
    ) -> Result<Vec<(VoteOption, i64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT vote_option, COUNT(*) AS vote_count FROM votes WHERE agenda_id = $1 GROUP BY vote_option",
        )
        .bind(agenda_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;

        rows.into_iter()
            .map(|row| {
                let option: String = row.get("vote_option");
                let count: i64 = row.get("vote_count");
                option
                    .parse::<VoteOption>()
                    .map(|option| (option, count))
                    .map_err(|detail| StoreError::Corrupt {
                        table: "votes",
                        detail,
                    })
            })
            .collect()
    }
}
