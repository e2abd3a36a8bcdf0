use crate::config::AppConfig;
use crate::store::{CareStore, InMemoryCareStore, PgCareStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CareStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = PgCareStore::connect(&config).await?;
        store.migrate().await?;

        Ok(Self {
            store: Arc::new(store) as Arc<dyn CareStore>,
            config: Arc::new(config),
        })
    }

    pub fn from_parts(store: Arc<dyn CareStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// In-memory store with the given config.
    pub fn from_config(config: AppConfig) -> Self {
        Self::from_parts(Arc::new(InMemoryCareStore::new()), Arc::new(config))
    }

    pub fn fake() -> Self {
        Self::from_config(AppConfig::for_tests())
    }
}
