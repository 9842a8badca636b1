//! Image replayer contract.
//!
//! The per-image worker (journal fetch, event decode, local apply) is an
//! external collaborator. The supervisor only drives its lifecycle:
//!
//! ```text
//!            start()                    stop()
//! Stopped ───────────► Starting ─┐  ┌─────────► Stopping
//!    ▲                           ▼  │               │
//!    └───────────────────────── Running ◄───────────┘
//!            (stop completion)
//! ```
//!
//! All operations are non-blocking: the worker completes them on its own
//! runtime and reports through the optional callback. The supervisor calls
//! them while holding the supervisor lock.

use crate::error::Result;
use crate::types::PoolId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Observable state of an image replayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not replaying; safe to destroy or start.
    Stopped,
    /// Start requested, bootstrap in progress.
    Starting,
    /// Tailing the remote journal and applying locally.
    Running,
    /// Stop requested, draining in-flight replay.
    Stopping,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "Stopped"),
            WorkerState::Starting => write!(f, "Starting"),
            WorkerState::Running => write!(f, "Running"),
            WorkerState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Completion for a start or stop request.
pub type LifecycleCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Per-worker status document, embedded in the admin `status` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub state: String,
    pub local_pool_id: PoolId,
    pub local_image_id: String,
    pub local_image_name: String,
    pub global_image_id: String,
}

/// Handle to one image replayer. The reconciler is the sole owner; a
/// worker is only destroyed after it has been observed as `Stopped`.
pub trait ImageReplayerHandle: Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> WorkerState;

    fn is_stopped(&self) -> bool {
        self.state() == WorkerState::Stopped
    }

    fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    /// Request a start. No-op unless stopped. `manual` marks operator
    /// intent (admin `start`) as opposed to reconciliation.
    fn start(&self, on_finish: Option<LifecycleCallback>, manual: bool);

    /// Request a stop. The callback fires once replay has drained.
    fn stop(&self, on_finish: Option<LifecycleCallback>, manual: bool);

    /// Stop and start again, preserving replay position.
    fn restart(&self);

    /// Flush buffered replay to the local image.
    fn flush(&self);

    /// Status snapshot for the admin surface.
    fn status(&self) -> WorkerStatus;

    fn local_pool_id(&self) -> PoolId;
    fn local_image_id(&self) -> String;
    fn local_image_name(&self) -> String;
    fn global_image_id(&self) -> String;
}

/// Everything needed to construct one image replayer.
#[derive(Debug, Clone)]
pub struct WorkerParams {
    pub local_mirror_uuid: String,
    pub remote_mirror_uuid: String,
    pub local_pool_id: PoolId,
    pub remote_pool_id: PoolId,
    pub image_id: String,
    pub global_image_id: String,
}

/// Constructs image replayers.
///
/// The factory captures the cluster handles and the runtime the workers
/// run on; the supervisor only supplies the per-image parameters.
pub trait ImageReplayerFactory: Send + Sync {
    fn create(&self, params: WorkerParams) -> Arc<dyn ImageReplayerHandle>;
}
