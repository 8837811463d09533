// src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const VOTER_IDENTIFIER_DIGITS: usize = 11;

/// A topic put up for a yes/no vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agenda {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Closed => "CLOSED",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OPEN" => Ok(SessionStatus::Open),
            "CLOSED" => Ok(SessionStatus::Closed),
            other => Err(format!("unknown session status `{other}`")),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The time-bounded window during which an agenda accepts votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSession {
    pub id: Uuid,
    pub agenda_id: Uuid,
    pub opened_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub closes_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl VotingSession {
    /// The stored status alone is not authoritative: a session whose window
    /// has lapsed is closed even while its status still reads OPEN.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Open && now < self.closes_at
    }

    pub fn observed_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.is_open_at(now) {
            SessionStatus::Open
        } else {
            SessionStatus::Closed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteOption {
    Yes,
    No,
}

impl VoteOption {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteOption::Yes => "YES",
            VoteOption::No => "NO",
        }
    }
}

impl FromStr for VoteOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" | "SIM" => Ok(VoteOption::Yes),
            "NO" | "NAO" | "NÃO" => Ok(VoteOption::No),
            other => Err(format!("unknown vote option `{other}`")),
        }
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    pub agenda_id: Uuid,
    pub voter_identifier: String,
    pub option: VoteOption,
    pub created_at: DateTime<Utc>,
}

/// Strips every non-digit character and keeps the result only when exactly
/// eleven digits remain, so `111.222.333-44` and `11122233344` are the same voter.
pub fn normalize_voter_identifier(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (digits.len() == VOTER_IDENTIFIER_DIGITS).then_some(digits)
}

/// Keeps the last two digits visible, for log lines.
pub fn mask_voter_identifier(identifier: &str) -> String {
    let visible = identifier.len().saturating_sub(2);
    identifier
        .char_indices()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgendaRequest {
    #[serde(default, alias = "titulo")]
    pub title: String,
    #[serde(default, alias = "descricao")]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionParams {
    #[serde(default, alias = "duracao")]
    pub duration: Option<i64>,
}

/// Raw vote payload; both fields are validated by the voting service so that a
/// missing or unrecognised value surfaces as a domain error rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default, alias = "cpf")]
    pub voter_identifier: Option<String>,
    #[serde(default, alias = "opcao")]
    pub option: Option<String>,
}

impl VoteRequest {
    pub fn new(voter_identifier: impl Into<String>, option: VoteOption) -> Self {
        Self {
            voter_identifier: Some(voter_identifier.into()),
            option: Some(option.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsSummary {
    pub yes: i64,
    pub no: i64,
    pub total: i64,
    pub status: SessionStatus,
}
