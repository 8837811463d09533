// src/state.rs
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::agenda::AgendaService;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError, StorageBackend};
use crate::db;
use crate::eligibility::{EligibilityClient, HttpEligibilityClient};
use crate::memory::MemoryStore;
use crate::repository::SharedStore;
use crate::voting::VotingService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to the database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to build the eligibility client: {0}")]
    Eligibility(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub agendas: AgendaService,
    pub voting: VotingService,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        clock: Arc<dyn Clock>,
        eligibility: Option<Arc<dyn EligibilityClient>>,
    ) -> Self {
        let mut voting = VotingService::new(store.clone(), clock.clone());
        if let Some(client) = eligibility {
            voting = voting.with_eligibility(client);
        }
        Self {
            agendas: AgendaService::new(store, clock),
            voting,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let store: SharedStore = match config.storage {
            StorageBackend::Postgres => {
                let pool = db::create_pool(config).await?;
                db::run_migrations(&pool).await?;
                info!("connected to postgres, migrations applied");
                Arc::new(db::PgStore::new(pool))
            }
            StorageBackend::Memory => {
                info!("using in-memory storage; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let eligibility: Option<Arc<dyn EligibilityClient>> =
            match (config.eligibility_enabled, &config.eligibility_base_url) {
                (true, Some(base_url)) => {
                    info!(%base_url, "eligibility checks enabled");
                    Some(Arc::new(HttpEligibilityClient::new(
                        base_url.clone(),
                        config.eligibility_timeout,
                    )?))
                }
                (true, None) => {
                    return Err(ConfigError::Missing {
                        key: "ELIGIBILITY_BASE_URL",
                    }
                    .into())
                }
                (false, _) => None,
            };

        Ok(Self::new(store, Arc::new(SystemClock), eligibility))
    }
}
