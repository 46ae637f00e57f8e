//! Shared server state.

use anyhow::{Context, Result};
use quickpoll_core::{
    Broadcaster, BroadcasterConfig, MemoryStore, PollService, PollStore, SqliteStore,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, StorageBackend};

/// State shared by every request and connection.
pub struct AppState {
    /// The poll service.
    pub service: PollService,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Build state around an existing service.
    #[must_use]
    pub fn new(service: PollService, config: Config) -> Self {
        Self { service, config }
    }

    /// Open the configured store and build the service on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll lifetime is out of range or the SQLite
    /// database cannot be opened or migrated.
    pub async fn from_config(config: Config) -> Result<Self> {
        let lifetime = config.polls.lifetime()?;

        let store: Arc<dyn PollStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new().with_lifetime(lifetime)),
            StorageBackend::Sqlite => {
                let store = SqliteStore::connect(
                    &config.storage.database_url,
                    config.storage.max_connections,
                )
                .await
                .with_context(|| {
                    format!("Failed to open database {}", config.storage.database_url)
                })?;
                Arc::new(store.with_lifetime(lifetime))
            }
        };
        info!(backend = store.name(), "Storage ready");

        let broadcaster = Arc::new(Broadcaster::with_config(BroadcasterConfig {
            max_subscriptions_per_connection: config.limits.max_subscriptions_per_connection,
        }));

        Ok(Self::new(PollService::new(store, broadcaster), config))
    }
}
