use crate::config::Config;
use crate::storage::Storage;
use crate::storage::driver::{filesystem::FilesystemStorage, memory::MemoryStorage};
use crate::utils::lock::HashLocks;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub locks: Arc<HashLocks>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let storage_backend: Arc<dyn Storage> = match config.storage_typ.as_str() {
            "MEMORY" => Arc::new(MemoryStorage::new()),
            _ => Arc::new(FilesystemStorage::new(&config.root_dir)),
        };
        Self::with_storage(config, storage_backend)
    }

    pub fn with_storage(config: Config, storage: Arc<dyn Storage>) -> Self {
        AppState {
            storage,
            locks: Arc::new(HashLocks::new()),
            config: Arc::new(config),
        }
    }
}
