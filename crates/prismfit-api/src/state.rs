//! Application state management

use crate::auth::{AuthService, CredentialHasher, JwtConfig, PasswordConfig, TokenSigner};
use prismfit_core::{
    AppConfig, MemoryRefreshTokenStore, MemoryUserDirectory, PgStore, RefreshTokenStore,
    StorageBackend, UserDirectory,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Authentication core
    pub auth: AuthService,
    /// Server start time
    pub start_time: Instant,
    /// Ready status
    pub is_ready: AtomicBool,
    storage_backend: String,
}

impl AppState {
    /// Build state over explicit storage backends
    pub fn with_backends(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        let storage_backend = users.name().to_string();
        let auth = AuthService::new(
            users,
            refresh_tokens,
            CredentialHasher::new(PasswordConfig::from(&config.auth)),
            TokenSigner::new(JwtConfig::from(&config.auth)),
            config.auth.min_registration_age,
        );

        Self {
            config,
            auth,
            start_time: Instant::now(),
            is_ready: AtomicBool::new(true),
            storage_backend,
        }
    }

    /// Build state from configuration, connecting to PostgreSQL if selected
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let state = match config.database.backend {
            StorageBackend::Memory => Self::with_backends(
                config,
                Arc::new(MemoryUserDirectory::new()),
                Arc::new(MemoryRefreshTokenStore::new()),
            ),
            StorageBackend::Postgres => {
                let store = Arc::new(
                    PgStore::connect(
                        &config.database.postgres_url,
                        config.database.postgres_pool_size,
                    )
                    .await?,
                );
                store.migrate().await?;
                Self::with_backends(config, store.clone(), store)
            }
        };

        tracing::info!(backend = %state.storage_backend, "Auth storage initialized");
        Ok(state)
    }

    /// Name of the storage backend in use
    pub fn storage_backend(&self) -> &str {
        &self.storage_backend
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }
}
