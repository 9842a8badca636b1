// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-pool lifecycle of the mirroring status watch.
//!
//! A status watch exists for a pool exactly while the pool has supervised
//! workers: it is opened on the reconciliation step that first inserts a
//! worker into a previously empty pool and closed on the step that empties
//! the pool. The watch exists for external observers of replayer progress;
//! the supervisor itself does not act on notifications.

use crate::cluster::{PoolContext, StatusWatchHandle};
use crate::error::{ReplayerError, Result};
use crate::types::PoolId;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

/// Owns one status watch per active pool.
#[derive(Default)]
pub struct StatusWatchManager {
    watches: BTreeMap<PoolId, Box<dyn StatusWatchHandle>>,
}

impl StatusWatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a watch for `pool_id`. Requires no existing entry.
    ///
    /// First writes the remove-down cleanup to the pool's mirroring
    /// metadata object (stale per-instance status left by a previous
    /// crashed instance), then registers the watch. Failure of either step
    /// leaves no entry behind; the caller skips worker creation for the
    /// pool this tick.
    pub async fn open(
        &mut self,
        pool_id: PoolId,
        pool: &dyn PoolContext,
        instance_id: u64,
    ) -> Result<()> {
        debug_assert!(!self.watches.contains_key(&pool_id));
        debug!(pool_id, instance_id, "initializing mirroring status");

        pool.mirror_status_remove_down()
            .await
            .map_err(|e| ReplayerError::Watch {
                pool_id,
                message: format!("error initializing mirroring status object: {e}"),
            })?;

        let watch = pool
            .watch_mirror_status()
            .await
            .map_err(|e| ReplayerError::Watch {
                pool_id,
                message: format!("error registering watcher: {e}"),
            })?;

        self.watches.insert(pool_id, watch);
        Ok(())
    }

    /// Close the watch for `pool_id`. Requires an existing entry.
    ///
    /// Unregister errors are logged but do not prevent the erase.
    pub async fn close(&mut self, pool_id: PoolId) {
        let Some(watch) = self.watches.remove(&pool_id) else {
            debug_assert!(false, "no status watch for pool {pool_id}");
            error!(pool_id, "no status watch registered for pool");
            return;
        };

        if let Err(e) = watch.unregister().await {
            warn!(
                pool_id,
                oid = watch.oid(),
                error = %e,
                "error unregistering watcher"
            );
        }
    }

    pub fn contains(&self, pool_id: PoolId) -> bool {
        self.watches.contains_key(&pool_id)
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}
