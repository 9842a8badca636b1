//! In-memory model of the supervised peer.
//!
//! Everything the reconciler mutates lives here, behind the single
//! supervisor lock: the per-pool worker maps, the per-pool status watches,
//! the bootstrap residue, and the manual-stop/stopping flags.

use crate::status_watch::StatusWatchManager;
use crate::types::{InitResidue, PoolId};
use crate::worker::ImageReplayerHandle;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-pool map of image id to its supervised worker.
pub(crate) type PoolWorkers = BTreeMap<String, Arc<dyn ImageReplayerHandle>>;

/// Supervisor-owned state. All mutation happens on the supervisor task
/// while it holds the supervisor lock; read-side consumers (admin status)
/// take the same lock.
#[derive(Default)]
pub struct ReplayerState {
    /// The current set: one worker per `(pool, image)` the remote
    /// advertises.
    pub(crate) images: BTreeMap<PoolId, PoolWorkers>,

    /// Bootstrap residue, consumed by the first reconciliation.
    pub(crate) init_residue: InitResidue,

    /// One status watch per pool with supervised workers.
    pub(crate) status_watches: StatusWatchManager,

    /// Set by admin `stop`; the control loop skips reconciliation while
    /// set, preserving membership.
    pub(crate) manual_stopped: bool,

    /// Terminal shutdown in progress; no new workers are created and admin
    /// commands are no-ops.
    pub(crate) stopping: bool,
}

impl ReplayerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the bootstrap scan's output. Called once from `init`.
    pub fn load_init_residue(&mut self, residue: InitResidue) {
        self.init_residue = residue;
    }

    /// Total number of supervised workers across all pools.
    pub fn worker_count(&self) -> usize {
        self.images.values().map(BTreeMap::len).sum()
    }

    /// Number of pools with an entry in the current set.
    pub fn pool_count(&self) -> usize {
        self.images.len()
    }

    /// Pool ids currently tracked.
    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.images.keys().copied().collect()
    }

    /// Look up a worker by pool and image id.
    pub fn worker(&self, pool_id: PoolId, image_id: &str) -> Option<Arc<dyn ImageReplayerHandle>> {
        self.images
            .get(&pool_id)
            .and_then(|pool| pool.get(image_id))
            .cloned()
    }

    /// Iterate every supervised worker.
    pub fn workers(&self) -> impl Iterator<Item = &Arc<dyn ImageReplayerHandle>> + '_ {
        self.images.values().flat_map(BTreeMap::values)
    }

    /// Whether a status watch is open for the pool.
    pub fn has_status_watch(&self, pool_id: PoolId) -> bool {
        self.status_watches.contains(pool_id)
    }

    /// Number of open status watches.
    pub fn status_watch_count(&self) -> usize {
        self.status_watches.len()
    }

    /// Number of images still in the bootstrap residue.
    pub fn init_residue_len(&self) -> usize {
        self.init_residue.values().map(|set| set.len()).sum()
    }

    pub fn is_manual_stopped(&self) -> bool {
        self.manual_stopped
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }
}
