use std::sync::Arc;

use anyhow::Context;
use filegate_service::{PolicyIssuer, StorageConfig, StorageService};
use secrecy::ExposeSecret;

use crate::config::{Config, Storage};

/// Shared reference to the gateway [service state](State).
pub type ServiceState = Arc<State>;

/// Reference to the gateway business logic.
///
/// This structure is created during server startup and shared with all HTTP request handlers. It
/// can be used to access the configured storage backend.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// The storage service instance.
    pub service: StorageService,
}

impl State {
    /// Builds the storage service for the configured backend.
    ///
    /// Fails if no signing secret is configured or the backend cannot be constructed. The server
    /// does not start without a working backend.
    pub async fn new(config: Config) -> anyhow::Result<ServiceState> {
        let issuer = policy_issuer(&config)?;
        let storage = map_storage_config(&config.storage);
        let service = StorageService::new(storage, issuer, config.service.operation_timeout)
            .await
            .context("failed to create storage service")?;

        Ok(Arc::new(Self { config, service }))
    }
}

fn policy_issuer(config: &Config) -> anyhow::Result<PolicyIssuer> {
    let Some(secret) = &config.upload_policy.secret else {
        anyhow::bail!("upload_policy.secret must be configured");
    };

    PolicyIssuer::new(
        secret.expose_secret().as_str().as_bytes(),
        config.upload_policy.ttl,
    )
    .context("invalid upload_policy configuration")
}

fn map_storage_config(config: &'_ Storage) -> StorageConfig<'_> {
    match config {
        Storage::FileSystem { path } => StorageConfig::FileSystem { path },
        Storage::S3Compatible { endpoint, bucket } => {
            StorageConfig::S3Compatible { endpoint, bucket }
        }
        Storage::Gcs { endpoint, bucket } => StorageConfig::Gcs {
            endpoint: endpoint.as_deref(),
            bucket,
        },
    }
}
