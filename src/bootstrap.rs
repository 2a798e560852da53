//! Startup state restoration: load every snapshot under `DATA_DIR`, then
//! additionally seed a fixture library when `TESTING_DATA` is set —
//! grounded on
//! `persistence.py::load_all_libraries()` plus the teacher's `main.rs`
//! pattern of doing this as an explicit step between constructing
//! `AppState` and binding the listener.

use std::path::Path;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::store::Store;

pub fn restore(store: &Store, config: &AppConfig) {
    let data_dir = Path::new(&config.data_dir);

    let count = crate::snapshot::load_all(store, data_dir);
    info!(count, "restored libraries from snapshots");

    if config.testing_data {
        seed_testing_data(store, config);
    }
}

fn seed_testing_data(store: &Store, config: &AppConfig) {
    let Some(path) = &config.testing_data_file else {
        warn!("TESTING_DATA set but TESTING_DATA_FILE is unset; starting with an empty store");
        return;
    };

    let loaded = crate::snapshot::load_library_from_file(store, Path::new(path));
    if loaded {
        info!(path, "seeded testing data from file");
    } else {
        warn!(path, "failed to load testing data file; starting with an empty store");
    }
}
