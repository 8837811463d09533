// src/pautas.rs
//! Routes in the shape the original Portuguese frontend reads:
//! `{id, titulo, descricao, createdAt}` and `{sim, nao, total, status}` with
//! `ABERTA`/`ENCERRADA`. Requests are the same as on `/agendas`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers;
use crate::models::{Agenda, CreateAgendaRequest, ResultsSummary, SessionStatus};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pauta {
    pub id: Uuid,
    pub titulo: String,
    pub descricao: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Agenda> for Pauta {
    fn from(agenda: Agenda) -> Self {
        Self {
            id: agenda.id,
            titulo: agenda.title,
            descricao: agenda.description,
            created_at: agenda.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessaoStatus {
    Aberta,
    Encerrada,
}

impl From<SessionStatus> for SessaoStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Open => SessaoStatus::Aberta,
            SessionStatus::Closed => SessaoStatus::Encerrada,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Resultado {
    pub sim: i64,
    pub nao: i64,
    pub total: i64,
    pub status: SessaoStatus,
}

impl From<ResultsSummary> for Resultado {
    fn from(summary: ResultsSummary) -> Self {
        Self {
            sim: summary.yes,
            nao: summary.no,
            total: summary.total,
            status: summary.status.into(),
        }
    }
}

pub async fn listar(State(state): State<AppState>) -> Result<Json<Vec<Pauta>>, AppError> {
    let pautas = state.agendas.list().await?;
    Ok(Json(pautas.into_iter().map(Pauta::from).collect()))
}

pub async fn criar(
    State(state): State<AppState>,
    body: Result<Json<CreateAgendaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Pauta>), AppError> {
    let (status, Json(agenda)) = handlers::create_agenda(State(state), body).await?;
    Ok((status, Json(agenda.into())))
}

pub async fn buscar(
    state: State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Pauta>, AppError> {
    let Json(agenda) = handlers::get_agenda(state, path).await?;
    Ok(Json(agenda.into()))
}

pub async fn resultado(
    state: State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Resultado>, AppError> {
    let Json(summary) = handlers::results(state, path).await?;
    Ok(Json(summary.into()))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(listar).post(criar))
        .route("/{id}", get(buscar))
        .route("/{id}/sessao", post(handlers::open_session))
        .route("/{id}/votar", post(handlers::vote))
        .route("/{id}/resultado", get(resultado))
}
