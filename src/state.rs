use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::UserService;
use crate::config::AppConfig;
use crate::db;
use crate::errors::AppError;
use crate::ingest::{IngestContext, IngestQueue, queue};
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sqlite: SqlitePool,
    pub store: Option<Arc<ObjectStore>>,
    pub queue: IngestQueue,
    pub user_service: Arc<UserService>,
}

impl AppState {
    /// Wire up configuration, the sqlite pool, the object store and the
    /// ingest machinery.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_config(Arc::new(AppConfig::from_env())).await
    }

    pub async fn with_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        for dir in [
            &config.workdir,
            &config.uploaddir,
            &config.tmpdir,
            &config.errordir,
            &config.logdir,
            &config.backupdir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let sqlite = db::connect(&config).await?;

        let store = if config.s3.endpoint.is_some() {
            match ObjectStore::connect(&config.s3).await {
                Ok(store) => {
                    tracing::info!("Object store ready, bucket {}", store.bucket_name());
                    Some(Arc::new(store))
                }
                Err(e) => {
                    tracing::error!("Object store unavailable: {}", e);
                    None
                }
            }
        } else {
            tracing::warn!("No object store configured; record uploads will quarantine");
            None
        };

        let user_service = UserService::new(&config);

        let queue = {
            let config = config.clone();
            let sqlite = sqlite.clone();
            let store = store.clone();
            queue::start(move |queue| IngestContext { config, pool: sqlite, store, queue }).await
        };

        Ok(Self { config, sqlite, store, queue, user_service })
    }

    /// Per-request handle for the ingest pipeline.
    pub fn ingest_context(&self) -> IngestContext {
        IngestContext {
            config: self.config.clone(),
            pool: self.sqlite.clone(),
            store: self.store.clone(),
            queue: self.queue.clone(),
        }
    }
}
