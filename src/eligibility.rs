// src/eligibility.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Eligibility {
    AbleToVote,
    UnableToVote,
}

#[derive(Debug, Deserialize)]
struct EligibilityResponse {
    status: Eligibility,
}

#[derive(Debug, Error)]
pub enum EligibilityError {
    /// The authority does not know the identifier.
    #[error("voter identifier unknown to the eligibility service")]
    UnknownIdentifier,

    #[error("eligibility request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait EligibilityClient: Send + Sync {
    async fn check(&self, voter_identifier: &str) -> Result<Eligibility, EligibilityError>;
}

/// Calls `GET {base_url}/users/{identifier}`. No retries.
pub struct HttpEligibilityClient {
    client: Client,
    base_url: String,
}

impl HttpEligibilityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EligibilityClient for HttpEligibilityClient {
    async fn check(&self, voter_identifier: &str) -> Result<Eligibility, EligibilityError> {
        let url = format!("{}/users/{}", self.base_url, voter_identifier);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EligibilityError::UnknownIdentifier);
        }

        let body: EligibilityResponse = response.error_for_status()?.json().await?;
        tracing::debug!(status = ?body.status, "eligibility checked");
        Ok(body.status)
    }
}
