//! Pool watcher contract.
//!
//! The pool watcher periodically lists the remote cluster's mirroring
//! directories and yields the current target set. The listing itself is an
//! external collaborator; the supervisor consumes three things:
//!
//! - [`refresh_images()`](PoolWatcher::refresh_images): one synchronous
//!   refresh, issued during `init` so the first reconciliation sees data.
//! - [`get_images()`](PoolWatcher::get_images): a cheap snapshot of the
//!   latest target set, read at the start of each reconciliation tick.
//! - [`subscribe()`](PoolWatcher::subscribe): a generation counter bumped
//!   whenever the target changes, so reconciliation is reactive rather
//!   than purely periodic. This replaces condition-variable signalling in
//!   earlier designs of this daemon.

use crate::cluster::BoxFuture;
use crate::types::PoolImageIds;
use std::sync::Mutex;
use tokio::sync::watch;

/// Source of the reconciliation target set.
pub trait PoolWatcher: Send + Sync {
    /// Force one refresh of the remote listing.
    fn refresh_images(&self) -> BoxFuture<'_, ()>;

    /// Snapshot of the most recent target set. Must be cheap; the
    /// supervisor calls it under the supervisor lock.
    fn get_images(&self) -> PoolImageIds;

    /// Change notifications: the receiver observes a new generation
    /// whenever the target set changes.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// A watcher over a fixed, externally updated target set.
///
/// Useful for embedders that already track remote pools elsewhere, and as
/// the building block for tests.
pub struct StaticPoolWatcher {
    images: Mutex<PoolImageIds>,
    generation: watch::Sender<u64>,
}

impl StaticPoolWatcher {
    pub fn new(images: PoolImageIds) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            images: Mutex::new(images),
            generation,
        }
    }

    /// Replace the target set and notify subscribers.
    pub fn set_images(&self, images: PoolImageIds) {
        *self.images.lock().expect("watcher images poisoned") = images;
        self.generation.send_modify(|g| *g += 1);
    }
}

impl Default for StaticPoolWatcher {
    fn default() -> Self {
        Self::new(PoolImageIds::new())
    }
}

impl PoolWatcher for StaticPoolWatcher {
    fn refresh_images(&self) -> BoxFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn get_images(&self) -> PoolImageIds {
        self.images.lock().expect("watcher images poisoned").clone()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}
