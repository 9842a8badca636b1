// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The reconciliation diff engine.
//!
//! Given the target set (what the remote advertises) and the current state
//! (what is supervised), computes and applies start/stop/delete decisions
//! in three phases:
//!
//! 1. **Bootstrap sweep** (first call only): match the startup residue
//!    against the target by global id; hand every survivor to the image
//!    deleter and clear the residue unconditionally.
//! 2. **Shutdown drift**: stop workers whose image (or whole pool) is no
//!    longer advertised. Stops are asynchronous half-steps: a worker still
//!    transitioning is retained and erased on a later tick once observed
//!    `Stopped`. A pool's status watch closes when its last worker goes.
//! 3. **Target install**: for each advertised pool, resolve the local pool
//!    by the remote pool's name, read both mirror uuids, open the status
//!    watch before the first worker, then create and start missing
//!    workers. Per-pool failures are logged and the pool is skipped for
//!    this tick; the target is retried on the next one.
//!
//! Starts can be gated on a pending deletion of the same image name; the
//! gate's resolution comes back as a [`SupervisorEvent::DeletionGateResolved`]
//! message rather than a nested completion closure.

use crate::cluster::ClusterClient;
use crate::deleter::DeleterSlot;
use crate::error::Result;
use crate::metrics;
use crate::supervisor::state::ReplayerState;
use crate::supervisor::types::SupervisorEvent;
use crate::types::{ImageIds, PoolId, PoolImageIds};
use crate::worker::{ImageReplayerFactory, ImageReplayerHandle, WorkerParams};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Applies target-set diffs to the replayer state.
///
/// Owns no state of its own; every call operates on a [`ReplayerState`]
/// borrowed under the supervisor lock.
pub struct Reconciler {
    local: Arc<dyn ClusterClient>,
    remote: Arc<dyn ClusterClient>,
    deleter: DeleterSlot,
    factory: Arc<dyn ImageReplayerFactory>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Reconciler {
    pub fn new(
        local: Arc<dyn ClusterClient>,
        remote: Arc<dyn ClusterClient>,
        deleter: DeleterSlot,
        factory: Arc<dyn ImageReplayerFactory>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            local,
            remote,
            deleter,
            factory,
            events,
        }
    }

    /// One reconciliation tick. Caller holds the supervisor lock.
    pub async fn reconcile(&self, state: &mut ReplayerState, target: &PoolImageIds) {
        metrics::record_reconcile_tick();

        self.reconcile_bootstrap(state, target);
        self.reconcile_drift(state, target).await;
        self.reconcile_target(state, target).await;
        self.sweep_empty_pools(state).await;

        metrics::set_worker_count(state.worker_count());
        metrics::set_status_watch_count(state.status_watch_count());
    }

    /// Phase 1: consume the bootstrap residue.
    ///
    /// Entries whose global id the target still advertises survive as
    /// normal workers (phase 3 creates them); everything else is scheduled
    /// for deletion. The residue is cleared unconditionally.
    fn reconcile_bootstrap(&self, state: &mut ReplayerState, target: &PoolImageIds) {
        if state.init_residue.is_empty() {
            return;
        }

        for (pool_id, images) in state.init_residue.iter_mut() {
            if let Some(remote_images) = target.get(pool_id) {
                for remote_image in remote_images {
                    images.remove(&crate::types::InitImageInfo::for_global_id(
                        &remote_image.global_id,
                    ));
                }
            }
        }

        let residue = std::mem::take(&mut state.init_residue);
        let Some(deleter) = self.deleter.get() else {
            warn!("image deleter already released, dropping bootstrap residue");
            return;
        };
        for images in residue.into_values() {
            for image in images {
                debug!(image_name = %image.name, "scheduling the deletion of init image");
                deleter.schedule_image_delete(
                    image.pool_id,
                    &image.id,
                    &image.name,
                    &image.global_id,
                );
                metrics::record_deletion_scheduled();
            }
        }
    }

    /// Phase 2: stop and erase workers the target no longer advertises.
    async fn reconcile_drift(&self, state: &mut ReplayerState, target: &PoolImageIds) {
        for pool_id in state.pool_ids() {
            let Some(pool_workers) = state.images.get_mut(&pool_id) else {
                continue;
            };

            match target.get(&pool_id) {
                None => {
                    // pool has no mirrored images
                    debug!(pool_id, "pool has no mirrored images");
                    pool_workers.retain(|_, worker| {
                        if worker.is_running() {
                            debug!(
                                global_image_id = %worker.global_image_id(),
                                "stop image replayer"
                            );
                        }
                        !self.stop_worker(worker)
                    });
                    if pool_workers.is_empty() {
                        state.images.remove(&pool_id);
                        state.status_watches.close(pool_id).await;
                    }
                }
                Some(image_ids) => {
                    pool_workers.retain(|image_id, worker| {
                        if image_ids.contains(&ImageIds::new(image_id.as_str(), "")) {
                            return true;
                        }
                        if worker.is_running() {
                            debug!(
                                global_image_id = %worker.global_image_id(),
                                "stop image replayer"
                            );
                        }
                        !self.stop_worker(worker)
                    });
                }
            }
        }
    }

    /// Phase 3: install workers for everything the target advertises.
    async fn reconcile_target(&self, state: &mut ReplayerState, target: &PoolImageIds) {
        for (pool_id, image_ids) in target {
            if image_ids.is_empty() {
                debug!(pool_id, "target pool advertises no images");
                continue;
            }

            let remote_pool = match self.remote.open_pool_by_id(*pool_id).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(pool_id, error = %e, "failed to lookup remote pool");
                    continue;
                }
            };

            let local_pool = match self.local.open_pool_by_name(remote_pool.pool_name()).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(pool = remote_pool.pool_name(), error = %e, "failed to lookup local pool");
                    continue;
                }
            };

            let local_mirror_uuid = match local_pool.mirror_uuid().await {
                Ok(uuid) => uuid,
                Err(e) => {
                    error!(
                        pool = local_pool.pool_name(),
                        error = %e,
                        "failed to retrieve local mirror uuid"
                    );
                    continue;
                }
            };

            let remote_mirror_uuid = match remote_pool.mirror_uuid().await {
                Ok(uuid) => uuid,
                Err(e) => {
                    error!(
                        pool = remote_pool.pool_name(),
                        error = %e,
                        "failed to retrieve remote mirror uuid"
                    );
                    continue;
                }
            };

            // The status watch must be live before the pool's first worker
            // exists; failure leaves the pool untracked until the next tick.
            if !state.status_watches.contains(*pool_id) {
                if let Err(e) = state
                    .status_watches
                    .open(*pool_id, local_pool.as_ref(), self.local.instance_id())
                    .await
                {
                    error!(pool_id, error = %e, "failed to initialize mirroring status");
                    continue;
                }
            }

            let pool_workers = state.images.entry(*pool_id).or_default();
            for image_id in image_ids {
                let worker = match pool_workers.get(&image_id.id) {
                    Some(worker) => Arc::clone(worker),
                    None => {
                        let worker = self.factory.create(WorkerParams {
                            local_mirror_uuid: local_mirror_uuid.clone(),
                            remote_mirror_uuid: remote_mirror_uuid.clone(),
                            local_pool_id: local_pool.pool_id(),
                            remote_pool_id: *pool_id,
                            image_id: image_id.id.clone(),
                            global_image_id: image_id.global_id.clone(),
                        });
                        metrics::record_worker_created();
                        pool_workers.insert(image_id.id.clone(), Arc::clone(&worker));
                        worker
                    }
                };

                if !worker.is_running() {
                    debug!(
                        global_image_id = %worker.global_image_id(),
                        "starting image replayer"
                    );
                }
                self.start_worker(*pool_id, &image_id.id, &worker, image_id.name.as_deref());
            }
        }
    }

    /// Remove pool entries whose worker map emptied without the pool
    /// leaving the target (e.g. the pool's install phase failed this
    /// tick), keeping the watch/images invariant intact.
    async fn sweep_empty_pools(&self, state: &mut ReplayerState) {
        let empty: Vec<PoolId> = state
            .images
            .iter()
            .filter(|(_, workers)| workers.is_empty())
            .map(|(pool_id, _)| *pool_id)
            .collect();
        for pool_id in empty {
            state.images.remove(&pool_id);
            if state.status_watches.contains(pool_id) {
                state.status_watches.close(pool_id).await;
            }
        }
    }

    /// Request a worker start, optionally gated on a pending deletion of
    /// the same image name.
    ///
    /// Idempotent: a worker that is not stopped is left alone. With a name
    /// the start waits for the deleter to clear that name; the gate's
    /// resolution comes back as a supervisor event.
    pub fn start_worker(
        &self,
        pool_id: PoolId,
        image_id: &str,
        worker: &Arc<dyn ImageReplayerHandle>,
        image_name: Option<&str>,
    ) {
        if !worker.is_stopped() {
            return;
        }

        match image_name {
            Some(name) => {
                let Some(deleter) = self.deleter.get() else {
                    debug!(image_name = name, "image deleter released, skipping start");
                    return;
                };
                let events = self.events.clone();
                let image_id = image_id.to_string();
                let image_name = name.to_string();
                deleter.wait_for_scheduled_deletion(
                    name,
                    Box::new(move |result| {
                        let _ = events.send(SupervisorEvent::DeletionGateResolved {
                            pool_id,
                            image_id,
                            image_name,
                            result,
                        });
                    }),
                    false,
                );
            }
            None => {
                worker.start(None, false);
                metrics::record_worker_started();
            }
        }
    }

    /// Handle a resolved deletion gate.
    ///
    /// Success starts the worker (exactly once: a worker no longer stopped
    /// is left alone); failure re-arms the gate. Gates resolving after the
    /// worker was erased, or after shutdown began, are discarded.
    pub fn handle_deletion_gate(
        &self,
        state: &ReplayerState,
        pool_id: PoolId,
        image_id: &str,
        image_name: &str,
        result: Result<()>,
    ) {
        if state.stopping {
            debug!(image_name, "discarding deletion gate during shutdown");
            return;
        }
        let Some(worker) = state.worker(pool_id, image_id) else {
            debug!(pool_id, image_id, "deletion gate resolved for unknown worker");
            return;
        };

        match result {
            Ok(()) => {
                if worker.is_stopped() {
                    debug!(
                        global_image_id = %worker.global_image_id(),
                        "starting image replayer"
                    );
                    worker.start(None, false);
                    metrics::record_worker_started();
                }
            }
            Err(e) => {
                debug!(image_name, error = %e, "deletion still pending, re-arming gate");
                self.start_worker(pool_id, image_id, &worker, Some(image_name));
            }
        }
    }

    /// Synchronous half-step of a worker stop.
    ///
    /// Returns `true` when the worker has been observed `Stopped` and may
    /// be erased. A running worker gets a stop request whose completion
    /// schedules the local image's deletion (best-effort: a no-op once the
    /// deleter reference has been released); a worker already transitioning
    /// is left to finish. Either way the caller retries next tick.
    fn stop_worker(&self, worker: &Arc<dyn ImageReplayerHandle>) -> bool {
        if worker.is_stopped() {
            return true;
        }

        if worker.is_running() {
            let deleter = self.deleter.clone();
            let pool_id = worker.local_pool_id();
            let image_id = worker.local_image_id();
            let image_name = worker.local_image_name();
            let global_image_id = worker.global_image_id();
            worker.stop(
                Some(Box::new(move |_result| {
                    if let Some(deleter) = deleter.get() {
                        deleter.schedule_image_delete(
                            pool_id,
                            &image_id,
                            &image_name,
                            &global_image_id,
                        );
                        metrics::record_deletion_scheduled();
                    }
                })),
                false,
            );
            metrics::record_worker_stopped();
        }

        false
    }
}
