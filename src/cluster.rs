// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cluster collaborator traits.
//!
//! The supervisor performs no direct network or on-disk I/O; everything it
//! needs from the local and remote clusters goes through these traits. The
//! daemon provides implementations backed by its cluster client library,
//! and tests provide recording mocks.
//!
//! # Non-blocking requirement
//!
//! Metadata reads ([`PoolContext::mirror_uuid`] and friends) are awaited by
//! the supervisor while it holds the supervisor lock. Implementations must
//! resolve promptly (single round trips, no unbounded retries), otherwise
//! the lock becomes a scalability ceiling for the admin surface.

use crate::error::Result;
use crate::types::PoolId;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Object holding a pool's mirroring metadata; status watches attach here.
pub const MIRRORING_OBJECT: &str = "rbd_mirroring";

/// Per-pool mirroring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Mirroring disabled; the pool is skipped at bootstrap.
    Disabled,
    /// Mirroring enabled per image.
    Image,
    /// Every journaled image in the pool is mirrored.
    Pool,
}

impl MirrorMode {
    /// Whether any mirroring is configured for the pool.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, MirrorMode::Disabled)
    }
}

/// Handle to one cluster (local or remote).
///
/// Shared read-only between the supervisor, the bootstrap scan, and worker
/// factories; there is no exclusive mutation.
pub trait ClusterClient: Send + Sync {
    /// Connect using the given per-peer configuration context.
    ///
    /// Called once from `init` for the remote handle; the local handle is
    /// handed in already connected.
    fn connect<'a>(&'a self, ctx: &'a crate::config::ClusterContext) -> BoxFuture<'a, ()>;

    /// Unique id of this client instance within the cluster.
    fn instance_id(&self) -> u64;

    /// List all pools as `(pool_id, pool_name)` pairs.
    fn pool_list(&self) -> BoxFuture<'_, Vec<(PoolId, String)>>;

    /// Base tier id for a pool. Differs from the pool's own id when the
    /// pool is a cache tier.
    fn pool_base_tier(&self, pool_id: PoolId) -> BoxFuture<'_, PoolId>;

    /// Open an I/O context for a pool by id.
    fn open_pool_by_id(&self, pool_id: PoolId) -> BoxFuture<'_, Arc<dyn PoolContext>>;

    /// Open an I/O context for a pool by name.
    ///
    /// Returns a NotFound error when no such pool exists; the bootstrap
    /// branches on it.
    fn open_pool_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Arc<dyn PoolContext>>;
}

/// I/O context scoped to one pool.
pub trait PoolContext: Send + Sync {
    /// Pool id within the owning cluster.
    fn pool_id(&self) -> PoolId;

    /// Pool name.
    fn pool_name(&self) -> &str;

    /// Read the pool's mirroring mode.
    fn mirror_mode(&self) -> BoxFuture<'_, MirrorMode>;

    /// Read the pool's mirror uuid.
    fn mirror_uuid(&self) -> BoxFuture<'_, String>;

    /// Page through the pool's mirroring directory.
    ///
    /// Returns up to `max` entries mapping image id to global image id,
    /// starting strictly after `start_after` in id order.
    fn mirror_image_list<'a>(
        &'a self,
        start_after: &'a str,
        max: usize,
    ) -> BoxFuture<'a, BTreeMap<String, String>>;

    /// Resolve an image's human-readable name via the pool directory.
    fn image_name_by_id<'a>(&'a self, image_id: &'a str) -> BoxFuture<'a, String>;

    /// Remove stale per-instance status entries left by a previous crashed
    /// instance from the pool's mirroring metadata object. Idempotent.
    fn mirror_status_remove_down(&self) -> BoxFuture<'_, ()>;

    /// Register a watch on the pool's mirroring metadata object.
    ///
    /// Implementations must acknowledge incoming notifications with an
    /// empty payload; the supervisor does not act on them.
    fn watch_mirror_status(&self) -> BoxFuture<'_, Box<dyn StatusWatchHandle>>;
}

/// Registered watch on a pool's mirroring metadata object.
pub trait StatusWatchHandle: Send + Sync {
    /// Object the watch is attached to.
    fn oid(&self) -> &str;

    /// Synchronously unregister the watch.
    fn unregister(&self) -> BoxFuture<'_, ()>;
}
