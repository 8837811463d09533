// src/handlers.rs
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Agenda, CreateAgendaRequest, OpenSessionParams, ResultsSummary, VoteRequest};
use crate::state::AppState;

fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// List all agendas, newest first
pub async fn list_agendas(State(state): State<AppState>) -> Result<Json<Vec<Agenda>>, AppError> {
    Ok(Json(state.agendas.list().await?))
}

/// Create an agenda
pub async fn create_agenda(
    State(state): State<AppState>,
    body: Result<Json<CreateAgendaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Agenda>), AppError> {
    let request = json_body(body)?;
    request.validate()?;
    let agenda = state
        .agendas
        .create(&request.title, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(agenda)))
}

pub async fn get_agenda(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Agenda>, AppError> {
    let id = path_id(path)?;
    Ok(Json(state.agendas.get(id).await?))
}

/// Open the voting session for an agenda; `duration` is in minutes
pub async fn open_session(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    params: Result<Query<OpenSessionParams>, QueryRejection>,
) -> Result<StatusCode, AppError> {
    let id = path_id(path)?;
    let Query(params) =
        params.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    state.agendas.open_session(id, params.duration).await?;
    Ok(StatusCode::CREATED)
}

/// Cast a vote
pub async fn vote(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let id = path_id(path)?;
    let request = json_body(body)?;
    state.voting.vote(id, &request).await?;
    Ok(StatusCode::CREATED)
}

/// Current tally and session status
pub async fn results(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ResultsSummary>, AppError> {
    let id = path_id(path)?;
    Ok(Json(state.voting.results(id).await?))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
