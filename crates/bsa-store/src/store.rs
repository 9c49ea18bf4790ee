//! Versioned snapshot store
//!
//! The single source of truth for canonical state. Commits are serialized
//! through the reconciler; reads are concurrent and hand out `Arc` clones of
//! immutable snapshots.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use bsa_core::{BsaError, BsaResult, StateData, StateSnapshot, VersionId};

/// Ordered history of committed state snapshots
#[derive(Debug)]
pub struct VersionStore {
    inner: RwLock<StoreInner>,
    bootstrap: Arc<StateSnapshot>,
}

#[derive(Debug)]
struct StoreInner {
    /// Committed snapshots, ordered by version
    snapshots: BTreeMap<VersionId, Arc<StateSnapshot>>,
    /// Highest version ever assigned; never regresses, even after pruning
    last_version: Option<VersionId>,
    /// Snapshots to retain; `None` keeps full history
    history_limit: Option<usize>,
}

impl VersionStore {
    /// Store retaining full history
    pub fn new() -> Self {
        VersionStore::with_history_limit(None)
    }

    /// Store retaining a bounded window of snapshots
    ///
    /// The latest committed snapshot is always retained.
    pub fn with_history_limit(history_limit: Option<usize>) -> Self {
        VersionStore {
            inner: RwLock::new(StoreInner {
                snapshots: BTreeMap::new(),
                last_version: None,
                history_limit,
            }),
            bootstrap: Arc::new(StateSnapshot::bootstrap()),
        }
    }

    /// Latest committed snapshot, or the bootstrap state before any commit
    pub fn head(&self) -> Arc<StateSnapshot> {
        let inner = self.inner.read();
        inner
            .snapshots
            .values()
            .next_back()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.bootstrap))
    }

    /// Version of the latest committed snapshot
    pub fn head_version(&self) -> Option<VersionId> {
        self.inner.read().snapshots.keys().next_back().copied()
    }

    /// Fetch the latest (`None`) or a specific historical version
    pub fn get(&self, version: Option<VersionId>) -> BsaResult<Arc<StateSnapshot>> {
        match version {
            None => Ok(self.head()),
            Some(v) => self
                .inner
                .read()
                .snapshots
                .get(&v)
                .cloned()
                .ok_or_else(|| BsaError::VersionNotFound(v.to_string())),
        }
    }

    /// Commit new data as the next version
    ///
    /// `expected_head` is the head the caller computed against; if the head
    /// has advanced since, the commit is refused and the caller must
    /// re-validate. The assigned identifier is strictly greater than every
    /// identifier previously assigned by this store.
    pub fn commit(
        &self,
        expected_head: Option<VersionId>,
        data: StateData,
    ) -> BsaResult<VersionId> {
        let mut inner = self.inner.write();

        let current = inner.snapshots.keys().next_back().copied();
        if current != expected_head {
            return Err(BsaError::HeadMoved {
                expected: expected_head,
                found: current,
            });
        }

        let version = match inner.last_version {
            Some(last) => last.next(),
            None => VersionId::FIRST,
        };
        inner.last_version = Some(version);
        inner
            .snapshots
            .insert(version, Arc::new(StateSnapshot::versioned(data, version)));

        if let Some(limit) = inner.history_limit {
            while inner.snapshots.len() > limit.max(1) {
                let oldest = *inner.snapshots.keys().next().unwrap();
                inner.snapshots.remove(&oldest);
            }
        }

        tracing::info!(version = %version, "state committed");
        Ok(version)
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.inner.read().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().snapshots.is_empty()
    }

    /// Retained versions in commit order
    pub fn versions(&self) -> Vec<VersionId> {
        self.inner.read().snapshots.keys().copied().collect()
    }
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}
