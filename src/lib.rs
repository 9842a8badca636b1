//! # Mirror Replayer
//!
//! A per-peer supervisor for block-device image mirroring: discovers which
//! images a remote cluster marks for mirroring and maintains exactly one
//! image replayer per discovered image, tailing the remote image's journal
//! and applying it locally.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         mirror-replayer                             │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────────────┐  │
//! │  │ PoolWatcher │───►│ ControlLoop │───►│ Reconciler              │  │
//! │  │ (target set)│    │ (30s ticks) │    │ (start/stop/delete diff)│  │
//! │  └─────────────┘    └─────────────┘    └───────────┬─────────────┘  │
//! │         ▲                  ▲                       ▼                │
//! │  ┌──────┴──────┐    ┌──────┴──────┐    ┌─────────────────────────┐  │
//! │  │ InitBootstrap│   │ AdminSurface│    │ ImageReplayers (1/image)│  │
//! │  │ (local scan) │   │ (5 verbs)   │    │ + StatusWatch (1/pool)  │  │
//! │  └─────────────┘    └─────────────┘    └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconciliation
//!
//! Each tick diffs the target set (what the remote advertises) against the
//! supervised set in three phases: a one-time bootstrap sweep that hands
//! stale local images to the deleter, a drift phase stopping workers the
//! remote dropped, and an install phase creating and starting workers for
//! new advertisements. Effects are asynchronous and may span ticks; a
//! worker is only erased once observed stopped.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirror_replayer::{
//!     Collaborators, MirrorReplayer, NoOpImageDeleter, PeerSpec, ReplayerOptions,
//!     StaticPoolWatcher,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     local: Arc<dyn mirror_replayer::ClusterClient>,
//! #     remote: Arc<dyn mirror_replayer::ClusterClient>,
//! #     factory: Arc<dyn mirror_replayer::ImageReplayerFactory>,
//! #     registry: Arc<dyn mirror_replayer::AdminRegistry>,
//! # ) -> mirror_replayer::Result<()> {
//! let collaborators = Collaborators {
//!     local,
//!     remote,
//!     image_deleter: Arc::new(NoOpImageDeleter),
//!     worker_factory: factory,
//!     pool_watcher: Arc::new(StaticPoolWatcher::default()),
//! };
//!
//! let mut replayer = MirrorReplayer::new(
//!     PeerSpec::for_testing("site-b"),
//!     ReplayerOptions::default(),
//!     Vec::new(),
//!     collaborators,
//!     registry,
//! );
//! replayer.init().await?;
//!
//! // Runs until shutdown; drains every worker before returning.
//! replayer.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod deleter;
pub mod error;
pub mod metrics;
pub mod pool_watcher;
pub mod status_watch;
pub mod supervisor;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use admin::{
    AdminCommand, AdminRegistry, AdminRequest, AdminSender, AdminSurface, OutputFormat,
    StatusDocument,
};
pub use cluster::{
    BoxFuture, ClusterClient, MirrorMode, PoolContext, StatusWatchHandle, MIRRORING_OBJECT,
};
pub use config::{ClientIdentity, ClusterContext, PeerSpec, ReplayerOptions};
pub use deleter::{DeleterSlot, DeletionCallback, ImageDeleter, NoOpImageDeleter};
pub use error::{ReplayerError, Result};
pub use pool_watcher::{PoolWatcher, StaticPoolWatcher};
pub use status_watch::StatusWatchManager;
pub use supervisor::{
    Collaborators, MirrorReplayer, Reconciler, ReplayerState, SupervisorEvent, SupervisorPhase,
};
pub use types::{ImageIds, InitImageInfo, InitResidue, PoolId, PoolImageIds};
pub use worker::{
    ImageReplayerFactory, ImageReplayerHandle, LifecycleCallback, WorkerParams, WorkerState,
    WorkerStatus,
};
