use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::bootstrap;
use crate::config::AppConfig;
use crate::embedder::{CohereEmbedder, DeterministicEmbedder, Embedder};
use crate::error::AppResult;
use crate::index_manager::IndexManager;
use crate::service::ServiceFacade;
use crate::store::Store;

const EMBEDDING_DIM_FALLBACK: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub facade: Arc<ServiceFacade>,
}

impl AppState {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let embedder: Arc<dyn Embedder> = match &config.cohere_api_key {
            Some(key) => Arc::new(CohereEmbedder::new(
                key.clone(),
                Duration::from_secs(config.embedder_timeout_secs),
            )?),
            None => {
                warn!("COHERE_API_KEY not set; using a deterministic local stand-in embedder");
                Arc::new(DeterministicEmbedder::new(EMBEDDING_DIM_FALLBACK))
            }
        };

        let store = Arc::new(Store::new());
        bootstrap::restore(&store, &config);

        let index_manager = Arc::new(IndexManager::new(config.ball_tree_default_leaf_size));
        let facade = Arc::new(ServiceFacade::new(
            store,
            index_manager,
            embedder,
            PathBuf::from(&config.data_dir),
        ));

        Ok(Self { config, facade })
    }
}
