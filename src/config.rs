use serde::{Deserialize, Serialize};

/// `X-API-Version` values the service accepts; an absent header is also
/// accepted for backwards compatibility, anything else is a 400.
pub const SUPPORTED_API_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub listen_addr: String,
    pub data_dir: String,
    pub cohere_api_key: Option<String>,
    pub embedder_timeout_secs: u64,
    pub ball_tree_default_leaf_size: usize,
    pub log_dir: Option<String>,
    /// When set, a single library is seeded from `TESTING_DATA_FILE` (or an
    /// inline fixture if that var is unset) on startup instead of scanning
    /// `data_dir` for snapshots.
    pub testing_data: bool,
    pub testing_data_file: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("VECTORDB_PORT").unwrap_or_else(|_| "8000".to_string());

        Self {
            listen_addr: format!("0.0.0.0:{}", port),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            cohere_api_key: std::env::var("COHERE_API_KEY").ok(),
            embedder_timeout_secs: std::env::var("EMBEDDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            ball_tree_default_leaf_size: std::env::var("BALL_TREE_DEFAULT_LEAF_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(40),
            log_dir: std::env::var("VECTORDB_LOG_DIR").ok(),
            testing_data: std::env::var("TESTING_DATA")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            testing_data_file: std::env::var("TESTING_DATA_FILE").ok(),
        }
    }
}
