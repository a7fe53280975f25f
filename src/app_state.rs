use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::controller::FlowDeps;
use crate::services::fashn::FashnClient;
use crate::services::polling::PollPolicy;
use crate::services::removal::RemoveBgClient;
use crate::services::storage::{S3ObjectStore, StorageError};

/// Shared application state: the wired-up external collaborators.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<S3ObjectStore>,
    pub provider: Arc<FashnClient>,
    pub removal: Option<Arc<RemoveBgClient>>,
    pub policy: PollPolicy,
}

impl AppState {
    pub fn new(db: PgPool, config: &AppConfig) -> Result<Self, StorageError> {
        let storage = S3ObjectStore::new(
            &config.s3_bucket,
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
            &config.s3_public_base_url,
        )?;

        let provider = FashnClient::new(&config.fashn_base_url, &config.fashn_api_key);

        let removal = config
            .removebg_api_key
            .as_deref()
            .map(|key| Arc::new(RemoveBgClient::new(key)));

        Ok(Self {
            db,
            storage: Arc::new(storage),
            provider: Arc::new(provider),
            removal,
            policy: PollPolicy::from_config(config),
        })
    }

    /// Collaborator set for a try-on controller, with history and
    /// entitlements backed by the relational store.
    pub fn flow_deps(&self) -> FlowDeps {
        FlowDeps {
            storage: self.storage.clone(),
            provider: self.provider.clone(),
            removal: self.removal.clone(),
            history: Arc::new(self.db.clone()),
            entitlements: Arc::new(self.db.clone()),
            policy: self.policy.clone(),
        }
    }
}
