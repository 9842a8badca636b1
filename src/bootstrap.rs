// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup scan of the local cluster.
//!
//! Enumerates images already marked as mirrored in each local pool before
//! the control loop starts, producing the initial residue that the first
//! reconciliation matches against the remote's advertisements. Images the
//! remote no longer advertises are scheduled for deletion rather than
//! leaked.
//!
//! The residue for a pool is keyed by the **remote** pool id so it lines
//! up with the target set. When the remote no longer has a pool of the
//! same name, the key falls back to the local pool id; such entries can
//! never match a target key and are therefore always swept into the
//! deleter on the first reconciliation (local orphan sweep on peer
//! rename).
//!
//! The scan never fails hard: per-pool and per-entry errors are logged and
//! the offender is skipped.

use crate::cluster::ClusterClient;
use crate::metrics;
use crate::types::{InitImageInfo, InitResidue};
use std::collections::BTreeSet;
use tracing::{debug, error};

/// Page size for mirroring directory listings.
const MAX_DIR_READ: usize = 1024;

/// Scan every local pool with mirroring enabled and collect its mirrored
/// images into the initial residue.
pub async fn scan_local_mirroring_images(
    local: &dyn ClusterClient,
    remote: &dyn ClusterClient,
) -> InitResidue {
    let mut residue = InitResidue::new();

    let pools = match local.pool_list().await {
        Ok(pools) => pools,
        Err(e) => {
            error!(error = %e, "error listing pools");
            return residue;
        }
    };

    for (pool_id, pool_name) in pools {
        match local.pool_base_tier(pool_id).await {
            Ok(base_tier) if base_tier != pool_id => {
                // pool is a cache tier; skip it
                continue;
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(pool = %pool_name, "pool no longer exists");
                continue;
            }
            Err(e) => {
                error!(pool = %pool_name, error = %e, "error retrieving base tier");
                continue;
            }
        }

        let local_pool = match local.open_pool_by_id(pool_id).await {
            Ok(pool) => pool,
            Err(e) if e.is_not_found() => {
                debug!(pool = %pool_name, "pool no longer exists");
                continue;
            }
            Err(e) => {
                error!(pool = %pool_name, error = %e, "error accessing pool");
                continue;
            }
        };

        match local_pool.mirror_mode().await {
            Ok(mode) if !mode.is_enabled() => {
                debug!(pool = %pool_name, "pool has mirroring disabled");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    pool = %pool_name,
                    error = %e,
                    "could not tell whether mirroring was enabled"
                );
                continue;
            }
        }

        // Residue key: remote pool id when the remote still has a pool of
        // this name, otherwise the local id so deletions can still be
        // scheduled.
        let key_pool_id = match remote.open_pool_by_name(local_pool.pool_name()).await {
            Ok(remote_pool) => remote_pool.pool_id(),
            Err(e) if e.is_not_found() => local_pool.pool_id(),
            Err(e) => {
                debug!(pool = %pool_name, error = %e, "error connecting to remote pool");
                continue;
            }
        };

        let mut images = BTreeSet::new();
        let mut last_read = String::new();
        loop {
            let page = match local_pool.mirror_image_list(&last_read, MAX_DIR_READ).await {
                Ok(page) => page,
                Err(e) => {
                    error!(pool = %pool_name, error = %e, "error listing mirrored image directory");
                    break;
                }
            };

            for (image_id, global_id) in &page {
                let image_name = match local_pool.image_name_by_id(image_id).await {
                    Ok(name) => name,
                    Err(e) => {
                        error!(image_id, error = %e, "error retrieving local image name");
                        continue;
                    }
                };
                images.insert(InitImageInfo::new(
                    global_id,
                    local_pool.pool_id(),
                    image_id,
                    image_name,
                ));
            }

            if let Some(last) = page.keys().next_back() {
                last_read = last.clone();
            }
            if page.len() < MAX_DIR_READ {
                break;
            }
        }

        if !images.is_empty() {
            debug!(
                pool = %pool_name,
                key_pool_id,
                count = images.len(),
                "found locally mirrored images"
            );
            metrics::record_bootstrap_images(images.len());
            residue.insert(key_pool_id, images);
        }
    }

    residue
}
