//! Shared policy state.
//!
//! Readers take a short read lock to clone the current snapshot handles
//! and evaluate without any lock held; a writer takes the exclusive lock
//! only to swap pointers after its transaction committed. A transaction
//! carrying a stale tag fails before the swap and leaves the served
//! snapshot untouched.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use verdict_core::content::ContentStore;
use verdict_core::storage::{PolicyStorage, PolicyUpdate, StorageError};

struct Snapshot {
    storage: Arc<PolicyStorage>,
    content: Arc<ContentStore>,
}

/// Handle to the currently served policy snapshot.
pub struct SharedStorage {
    inner: RwLock<Snapshot>,
}

impl SharedStorage {
    /// Creates shared state serving the given snapshot.
    #[must_use]
    pub fn new(storage: PolicyStorage, content: ContentStore) -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                storage: Arc::new(storage),
                content: Arc::new(content),
            }),
        }
    }

    /// Creates shared state with no policies installed.
    ///
    /// Every request evaluates to NotApplicable until a snapshot is
    /// swapped in.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(PolicyStorage::empty(None), ContentStore::new())
    }

    /// Clones the current snapshot handles.
    pub async fn snapshot(&self) -> (Arc<PolicyStorage>, Arc<ContentStore>) {
        let guard = self.inner.read().await;
        (Arc::clone(&guard.storage), Arc::clone(&guard.content))
    }

    /// Installs a new storage snapshot.
    pub async fn swap(&self, storage: PolicyStorage) {
        let mut guard = self.inner.write().await;
        info!(tag = ?storage.tag(), "installing policy snapshot");
        guard.storage = Arc::new(storage);
    }

    /// Installs a new content store.
    pub async fn swap_content(&self, content: ContentStore) {
        let mut guard = self.inner.write().await;
        guard.content = Arc::new(content);
    }

    /// Runs an update through a transaction and swaps in the result.
    ///
    /// The transaction body runs without the lock; the exclusive lock is
    /// taken only to re-validate the tag and swap pointers.
    ///
    /// # Errors
    ///
    /// Propagates transaction failures; a tag that went stale between
    /// the snapshot and the swap fails with
    /// [`StorageError::PolicyTagsNotMatch`].
    pub async fn apply_update(&self, update: &PolicyUpdate) -> Result<(), StorageError> {
        let (storage, _) = self.snapshot().await;

        let mut tx = storage.new_transaction(&update.old_tag())?;
        tx.apply(update)?;
        let committed = tx.commit()?;

        let mut guard = self.inner.write().await;
        guard.storage.check_tag(Some(&update.old_tag()))?;
        info!(tag = ?committed.tag(), "installing policy snapshot");
        guard.storage = Arc::new(committed);
        Ok(())
    }
}

impl Default for SharedStorage {
    fn default() -> Self {
        Self::empty()
    }
}
