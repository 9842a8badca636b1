// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The per-peer supervisor.
//!
//! One [`MirrorReplayer`] pairs the local cluster with one remote peer. It
//! discovers which images the remote marks for mirroring and maintains
//! exactly one image replayer per discovered image, reconciling the target
//! set against the supervised set as either changes.
//!
//! # Lifecycle
//!
//! 1. [`new()`](MirrorReplayer::new) registers the admin surface but does
//!    not start anything.
//! 2. [`init()`](MirrorReplayer::init) builds the per-peer configuration
//!    context, connects the remote handle, bootstraps locally known
//!    images, issues one synchronous discovery refresh, and spawns the
//!    control loop.
//! 3. [`shutdown()`](MirrorReplayer::shutdown) sets `stopping`, unregisters
//!    the admin surface, and joins the loop, which drains every worker
//!    against an empty target before exiting.
//!
//! # Concurrency
//!
//! The control loop is a single tokio task consuming events (periodic
//! ticks, pool watcher notifications, admin commands, deletion-gate
//! resolutions, shutdown). All supervised state lives behind one mutex,
//! held for the duration of each event; worker and deleter operations are
//! fire-and-forget, so nothing blocks under the lock.

mod reconcile;
mod state;
mod types;

pub use reconcile::Reconciler;
pub use state::ReplayerState;
pub use types::{SupervisorEvent, SupervisorPhase};

use crate::admin::{AdminRequest, AdminSurface, AdminRegistry, StatusDocument};
use crate::bootstrap;
use crate::cluster::ClusterClient;
use crate::config::{ClusterContext, PeerSpec, ReplayerOptions};
use crate::deleter::{DeleterSlot, ImageDeleter};
use crate::error::{ReplayerError, Result};
use crate::metrics;
use crate::pool_watcher::PoolWatcher;
use crate::types::PoolImageIds;
use crate::worker::ImageReplayerFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// External collaborators a supervisor is wired to.
pub struct Collaborators {
    /// Local cluster handle, already connected.
    pub local: Arc<dyn ClusterClient>,
    /// Remote cluster handle; connected during `init`.
    pub remote: Arc<dyn ClusterClient>,
    /// Durable deletion queue shared across peers.
    pub image_deleter: Arc<dyn ImageDeleter>,
    /// Constructs image replayers.
    pub worker_factory: Arc<dyn ImageReplayerFactory>,
    /// Source of the reconciliation target set.
    pub pool_watcher: Arc<dyn PoolWatcher>,
}

/// Supervisor for one remote peer's image replayers.
pub struct MirrorReplayer {
    peer: PeerSpec,
    options: ReplayerOptions,
    extra_args: Vec<String>,
    remote: Arc<dyn ClusterClient>,
    local: Arc<dyn ClusterClient>,
    pool_watcher: Arc<dyn PoolWatcher>,
    reconciler: Arc<Reconciler>,
    deleter: DeleterSlot,
    state: Arc<Mutex<ReplayerState>>,
    events_rx: Option<mpsc::UnboundedReceiver<SupervisorEvent>>,
    admin_rx: Option<mpsc::UnboundedReceiver<AdminRequest>>,
    shutdown_tx: watch::Sender<bool>,
    phase_tx: Option<watch::Sender<SupervisorPhase>>,
    phase_rx: watch::Receiver<SupervisorPhase>,
    admin: Option<AdminSurface>,
    loop_handle: Option<JoinHandle<()>>,
}

impl MirrorReplayer {
    /// Construct the supervisor and register its admin surface.
    ///
    /// The control loop is not started; call [`init()`](Self::init).
    pub fn new(
        peer: PeerSpec,
        options: ReplayerOptions,
        extra_args: Vec<String>,
        collaborators: Collaborators,
        admin_registry: Arc<dyn AdminRegistry>,
    ) -> Self {
        let Collaborators {
            local,
            remote,
            image_deleter,
            worker_factory,
            pool_watcher,
        } = collaborators;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (admin_tx, admin_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(SupervisorPhase::Created);

        let deleter = DeleterSlot::new(image_deleter);
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            deleter.clone(),
            worker_factory,
            events_tx,
        ));

        let admin = AdminSurface::register(admin_registry, &peer.cluster_name, admin_tx);

        Self {
            peer,
            options,
            extra_args,
            remote,
            local,
            pool_watcher,
            reconciler,
            deleter,
            state: Arc::new(Mutex::new(ReplayerState::new())),
            events_rx: Some(events_rx),
            admin_rx: Some(admin_rx),
            shutdown_tx,
            phase_tx: Some(phase_tx),
            phase_rx,
            admin: Some(admin),
            loop_handle: None,
        }
    }

    /// Current control loop phase.
    pub fn phase(&self) -> SupervisorPhase {
        *self.phase_rx.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<SupervisorPhase> {
        self.phase_rx.clone()
    }

    /// The supervised peer.
    pub fn peer(&self) -> &PeerSpec {
        &self.peer
    }

    /// Shared supervised state, for read-side consumers. Mutation belongs
    /// to the control loop.
    pub fn shared_state(&self) -> Arc<Mutex<ReplayerState>> {
        Arc::clone(&self.state)
    }

    /// Render the status document directly (same output as the `status`
    /// admin command).
    pub async fn status(&self, format: crate::admin::OutputFormat) -> String {
        let state = self.state.lock().await;
        StatusDocument::collect(&self.peer, &state).render(format)
    }

    /// Initialize and start the control loop.
    ///
    /// Builds the per-peer configuration context (environment, then
    /// `extra_args`, then the forced cache disable), connects the remote
    /// cluster handle, bootstraps locally mirrored images, issues one
    /// synchronous discovery refresh, and spawns the loop. Fatal errors
    /// are returned before anything is spawned.
    pub async fn init(&mut self) -> Result<()> {
        debug!(peer = %self.peer, "replaying for peer");

        if self.loop_handle.is_some() || self.events_rx.is_none() {
            return Err(ReplayerError::Internal(
                "mirror replayer already initialized".to_string(),
            ));
        }

        let mut ctx = ClusterContext::new(&self.peer)?;
        ctx.apply_env()?;
        ctx.apply_args(&self.extra_args)?;
        ctx.disable_image_cache();

        if let Err(e) = self.remote.connect(&ctx).await {
            error!(peer = %self.peer, error = %e, "error connecting to remote cluster");
            return Err(e);
        }
        debug!(peer = %self.peer, "connected");

        // Bootstrap existing mirroring images
        let residue =
            bootstrap::scan_local_mirroring_images(self.local.as_ref(), self.remote.as_ref())
                .await;
        self.state.lock().await.load_init_residue(residue);

        if let Err(e) = self.pool_watcher.refresh_images().await {
            warn!(error = %e, "initial image refresh failed, first tick will retry");
        }

        let (Some(events_rx), Some(admin_rx), Some(phase_tx)) = (
            self.events_rx.take(),
            self.admin_rx.take(),
            self.phase_tx.take(),
        ) else {
            return Err(ReplayerError::Internal(
                "mirror replayer already initialized".to_string(),
            ));
        };

        let control_loop = ControlLoop {
            peer: self.peer.clone(),
            state: Arc::clone(&self.state),
            reconciler: Arc::clone(&self.reconciler),
            pool_watcher: Arc::clone(&self.pool_watcher),
            deleter: self.deleter.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            phase_tx,
            poll_interval: self.options.poll_interval_duration(),
            drain_interval: self.options.drain_interval_duration(),
        };
        self.loop_handle = Some(tokio::spawn(control_loop.run(events_rx, admin_rx)));

        Ok(())
    }

    /// Tear the supervisor down.
    ///
    /// Order matters: `stopping` is set first so in-flight admin commands
    /// observe it, then the admin surface unregisters, then the loop is
    /// joined. Blocks until the drain empties the supervised set.
    pub async fn shutdown(&mut self) {
        info!(peer = %self.peer, "shutting down mirror replayer");

        let _ = self.shutdown_tx.send(true);
        self.state.lock().await.stopping = true;

        if let Some(mut admin) = self.admin.take() {
            admin.unregister();
        }

        if let Some(handle) = self.loop_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "control loop panicked during shutdown");
            }
        }
    }
}

/// The background task driving periodic reconciliation.
struct ControlLoop {
    peer: PeerSpec,
    state: Arc<Mutex<ReplayerState>>,
    reconciler: Arc<Reconciler>,
    pool_watcher: Arc<dyn PoolWatcher>,
    deleter: DeleterSlot,
    shutdown_rx: watch::Receiver<bool>,
    phase_tx: watch::Sender<SupervisorPhase>,
    poll_interval: Duration,
    drain_interval: Duration,
}

impl ControlLoop {
    async fn run(
        self,
        mut events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
        mut admin_rx: mpsc::UnboundedReceiver<AdminRequest>,
    ) {
        let ControlLoop {
            peer,
            state,
            reconciler,
            pool_watcher,
            deleter,
            mut shutdown_rx,
            phase_tx,
            poll_interval,
            drain_interval,
        } = self;

        let span = tracing::info_span!("mirror_replayer", peer = %peer);
        async move {
            info!("control loop started");
            let _ = phase_tx.send(SupervisorPhase::Running);
            metrics::set_phase("Running");

            let mut watcher_rx = pool_watcher.subscribe();
            let mut watcher_closed = false;
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    Some(req) = admin_rx.recv() => {
                        handle_event(
                            SupervisorEvent::Admin(req),
                            &peer, &state, &reconciler, &phase_tx,
                        ).await;
                    }
                    Some(event) = events_rx.recv() => {
                        handle_event(event, &peer, &state, &reconciler, &phase_tx).await;
                    }
                    changed = watcher_rx.changed(), if !watcher_closed => {
                        // Fresh discovery data; reconcile now and restart
                        // the periodic deadline.
                        match changed {
                            Ok(()) => {
                                tick(&state, &reconciler, pool_watcher.as_ref()).await;
                                interval.reset();
                            }
                            Err(_) => watcher_closed = true,
                        }
                    }
                    _ = interval.tick() => {
                        tick(&state, &reconciler, pool_watcher.as_ref()).await;
                    }
                }
            }

            drain(&state, &reconciler, &deleter, &phase_tx, &mut admin_rx, drain_interval)
                .await;
        }
        .instrument(span)
        .await;
    }
}

/// One reconciliation tick: read the target and diff, unless manually
/// stopped or already stopping.
async fn tick(
    state: &Mutex<ReplayerState>,
    reconciler: &Reconciler,
    pool_watcher: &dyn PoolWatcher,
) {
    let mut state = state.lock().await;
    if state.manual_stopped || state.stopping {
        return;
    }
    let target = pool_watcher.get_images();
    reconciler.reconcile(&mut state, &target).await;
}

/// Dispatch one supervisor event.
async fn handle_event(
    event: SupervisorEvent,
    peer: &PeerSpec,
    state: &Mutex<ReplayerState>,
    reconciler: &Reconciler,
    phase_tx: &watch::Sender<SupervisorPhase>,
) {
    match event {
        SupervisorEvent::Admin(req) => {
            handle_admin(req, peer, state, phase_tx).await;
        }
        SupervisorEvent::DeletionGateResolved {
            pool_id,
            image_id,
            image_name,
            result,
        } => {
            let state = state.lock().await;
            reconciler.handle_deletion_gate(&state, pool_id, &image_id, &image_name, result);
        }
    }
}

/// Execute one admin command. All verbs are no-ops while stopping; `flush`
/// is also a no-op while manually stopped.
async fn handle_admin(
    req: AdminRequest,
    peer: &PeerSpec,
    state: &Mutex<ReplayerState>,
    phase_tx: &watch::Sender<SupervisorPhase>,
) {
    use crate::admin::AdminCommand;

    let mut state = state.lock().await;
    if state.stopping {
        let _ = req.responder.send(String::new());
        return;
    }

    debug!(command = req.command.verb(), "admin command");
    metrics::record_admin_command(req.command.verb());

    let output = match req.command {
        AdminCommand::Status => StatusDocument::collect(peer, &state).render(req.format),
        AdminCommand::Start => {
            state.manual_stopped = false;
            let _ = phase_tx.send(SupervisorPhase::Running);
            metrics::set_phase("Running");
            for worker in state.workers() {
                worker.start(None, true);
            }
            String::new()
        }
        AdminCommand::Stop => {
            state.manual_stopped = true;
            let _ = phase_tx.send(SupervisorPhase::ManualStopped);
            metrics::set_phase("ManualStopped");
            for worker in state.workers() {
                worker.stop(None, true);
            }
            String::new()
        }
        AdminCommand::Restart => {
            state.manual_stopped = false;
            let _ = phase_tx.send(SupervisorPhase::Running);
            metrics::set_phase("Running");
            for worker in state.workers() {
                worker.restart();
            }
            String::new()
        }
        AdminCommand::Flush => {
            if !state.manual_stopped {
                for worker in state.workers() {
                    worker.flush();
                }
            }
            String::new()
        }
    };
    let _ = req.responder.send(output);
}

/// Shutdown drain: release the deleter reference, then reconcile with an
/// empty target until the supervised set empties.
async fn drain(
    state: &Mutex<ReplayerState>,
    reconciler: &Reconciler,
    deleter: &DeleterSlot,
    phase_tx: &watch::Sender<SupervisorPhase>,
    admin_rx: &mut mpsc::UnboundedReceiver<AdminRequest>,
    drain_interval: Duration,
) {
    info!("draining image replayers");
    let _ = phase_tx.send(SupervisorPhase::Draining);
    metrics::set_phase("Draining");

    deleter.release();

    let empty = PoolImageIds::new();
    loop {
        {
            let mut state = state.lock().await;
            state.stopping = true;
            reconciler.reconcile(&mut state, &empty).await;
            if state.images.is_empty() {
                debug_assert!(state.status_watches.is_empty());
                break;
            }
        }

        // Late admin commands are no-ops during shutdown; answer them so
        // the transport does not hang.
        while let Ok(req) = admin_rx.try_recv() {
            let _ = req.responder.send(String::new());
        }

        tokio::time::sleep(drain_interval).await;
    }

    let _ = phase_tx.send(SupervisorPhase::Terminated);
    metrics::set_phase("Terminated");
    info!("control loop terminated");
}
