// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::eligibility::EligibilityError;
use crate::repository::{StoreError, SESSION_AGENDA_UNIQUE, VOTE_AGENDA_VOTER_UNIQUE};

pub const ALREADY_VOTED: &str = "voter has already voted on this agenda";
pub const SESSION_EXISTS: &str = "a voting session already exists for this agenda";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        AppError::Unprocessable(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not-found",
            AppError::Unprocessable(_) => "unprocessable",
            AppError::Conflict(_) => "conflict",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation-error",
            AppError::Internal(_) => "error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } if constraint == VOTE_AGENDA_VOTER_UNIQUE => {
                AppError::Conflict(ALREADY_VOTED.to_string())
            }
            StoreError::UniqueViolation { constraint } if constraint == SESSION_AGENDA_UNIQUE => {
                AppError::Conflict(SESSION_EXISTS.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<EligibilityError> for AppError {
    fn from(err: EligibilityError) -> Self {
        match err {
            EligibilityError::UnknownIdentifier => {
                AppError::NotFound("invalid voter identifier".to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "unexpected error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                kind: self.kind(),
                message,
            }),
        )
            .into_response()
    }
}
