//! Image identity types shared between the bootstrap scan, the pool
//! watcher's target set, and the reconciler.
//!
//! Two equality domains coexist here:
//!
//! - [`ImageIds`] compares on the pool-local image `id` only. The target
//!   set and the images map are keyed by it; `global_id` and `name` are
//!   advisory payloads carried forward.
//! - [`InitImageInfo`] compares on `global_id` only, so locally discovered
//!   images can be matched against remote advertisements that carry only
//!   global ids.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// Numeric identifier of a storage pool, scoped to a cluster handle.
pub type PoolId = i64;

/// Target set produced by the pool watcher: remote pool id to the images
/// the remote advertises for mirroring.
pub type PoolImageIds = BTreeMap<PoolId, BTreeSet<ImageIds>>;

/// Images discovered locally at startup, keyed by their reconciliation
/// pool id. Consumed (drained) on the first reconciliation.
pub type InitResidue = BTreeMap<PoolId, BTreeSet<InitImageInfo>>;

/// Identity of one mirrored image as advertised by the remote.
///
/// Equality, ordering, and hashing consider `id` alone.
#[derive(Debug, Clone)]
pub struct ImageIds {
    /// Pool-local image identifier.
    pub id: String,
    /// Cluster-independent stable identity, used to match local and remote
    /// instances of the same image.
    pub global_id: String,
    /// Optional human-readable name, carried for deletion scheduling.
    pub name: Option<String>,
}

impl ImageIds {
    /// Create an entry without a name.
    ///
    /// Also usable as a lookup probe: pass an empty `global_id` since only
    /// `id` participates in comparisons.
    pub fn new(id: impl Into<String>, global_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            global_id: global_id.into(),
            name: None,
        }
    }

    /// Attach a human-readable name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PartialEq for ImageIds {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageIds {}

impl PartialOrd for ImageIds {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageIds {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for ImageIds {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One image found in the local mirroring directory at startup.
///
/// Equality and ordering consider `global_id` alone.
#[derive(Debug, Clone)]
pub struct InitImageInfo {
    /// Cluster-independent stable identity.
    pub global_id: String,
    /// Local pool id, used when scheduling the image's deletion.
    pub pool_id: PoolId,
    /// Pool-local image identifier.
    pub id: String,
    /// Human-readable image name.
    pub name: String,
}

impl InitImageInfo {
    pub fn new(
        global_id: impl Into<String>,
        pool_id: PoolId,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            global_id: global_id.into(),
            pool_id,
            id: id.into(),
            name: name.into(),
        }
    }

    /// Lookup probe carrying only the global id.
    pub fn for_global_id(global_id: impl Into<String>) -> Self {
        Self {
            global_id: global_id.into(),
            pool_id: 0,
            id: String::new(),
            name: String::new(),
        }
    }
}

impl PartialEq for InitImageInfo {
    fn eq(&self, other: &Self) -> bool {
        self.global_id == other.global_id
    }
}

impl Eq for InitImageInfo {}

impl PartialOrd for InitImageInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InitImageInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.global_id.cmp(&other.global_id)
    }
}
