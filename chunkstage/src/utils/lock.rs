use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::domain::ContentHash;

/// Per-hash reader/writer locks.
///
/// Chunk stores hold the shared side, merges the exclusive side, so a merge
/// never observes a staging area that is still being written and two merges
/// of one hash never run together. Unrelated hashes never contend.
#[derive(Default)]
pub struct HashLocks {
    locks: Mutex<HashMap<ContentHash, Arc<RwLock<()>>>>,
}

impl HashLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, hash: &ContentHash) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().await;
        // Entries only referenced by the map are idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(hash.clone()).or_default().clone()
    }

    /// Waits for any merge of `hash` to finish, then holds it off.
    pub async fn shared(&self, hash: &ContentHash) -> OwnedRwLockReadGuard<()> {
        self.lock_for(hash).await.read_owned().await
    }

    /// Takes exclusive access to `hash`, or `None` if anyone else holds it.
    pub async fn try_exclusive(&self, hash: &ContentHash) -> Option<OwnedRwLockWriteGuard<()>> {
        self.lock_for(hash).await.try_write_owned().ok()
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
