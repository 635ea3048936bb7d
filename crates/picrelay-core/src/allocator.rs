use std::sync::Arc;

use picrelay_store::{rotate, MetadataStore, StoreError, StoreResult};
use picrelay_types::{RepositoryId, RepositoryList};

/// A claimed rotation slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub index: u64,
    pub repository: RepositoryId,
}

/// Strict round-robin over the configured repositories.
///
/// The rotation position lives in the metadata store, so every process
/// sharing that store shares one rotation. No retries happen here.
#[derive(Clone)]
pub struct RepositoryAllocator {
    store: Arc<dyn MetadataStore>,
    repositories: RepositoryList,
}

impl RepositoryAllocator {
    pub fn new(store: Arc<dyn MetadataStore>, repositories: RepositoryList) -> Self {
        Self {
            store,
            repositories,
        }
    }

    pub fn repositories(&self) -> &RepositoryList {
        &self.repositories
    }

    /// Claim the next slot. The counter advances as a side effect and is
    /// never given back, whatever the caller does with the slot.
    pub async fn next_repository(&self) -> StoreResult<Allocation> {
        let index = self
            .store
            .read_and_advance_counter(self.repositories.modulus())
            .await?;
        self.allocation(index)
    }

    /// The slot the next call to `next_repository` would claim, absent
    /// concurrent claims. Does not advance the counter.
    pub async fn peek(&self) -> StoreResult<Allocation> {
        let counter = self.store.current_counter().await?;
        let (index, _) = rotate(counter, self.repositories.modulus());
        self.allocation(index)
    }

    fn allocation(&self, index: u64) -> StoreResult<Allocation> {
        let repository = self.repositories.get(index).cloned().ok_or_else(|| {
            StoreError::Corrupt(format!(
                "rotation index {index} outside {} repositories",
                self.repositories.len()
            ))
        })?;
        Ok(Allocation { index, repository })
    }
}

impl std::fmt::Debug for RepositoryAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryAllocator")
            .field("store", &self.store.backend())
            .field("repositories", &self.repositories)
            .finish()
    }
}
