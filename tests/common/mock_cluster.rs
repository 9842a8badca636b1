//! Mock cluster handles and pool contexts.
//!
//! Records connect/watch/cleanup calls and supports per-pool failure
//! injection for watch registration, uuid reads, and directory listings.

use mirror_replayer::{
    BoxFuture, ClusterClient, ClusterContext, MirrorMode, PoolContext, PoolId, ReplayerError,
    StatusWatchHandle, MIRRORING_OBJECT,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock implementation of `ClusterClient`.
pub struct MockCluster {
    cluster_name: String,
    instance_id: u64,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    connect_error: Mutex<Option<String>>,
    last_context: Mutex<Option<ClusterContext>>,
    pools: Mutex<BTreeMap<PoolId, Arc<MockPool>>>,
    base_tiers: Mutex<BTreeMap<PoolId, PoolId>>,
}

impl MockCluster {
    pub fn new(cluster_name: &str) -> Arc<Self> {
        Arc::new(Self {
            cluster_name: cluster_name.to_string(),
            instance_id: 4242,
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            connect_error: Mutex::new(None),
            last_context: Mutex::new(None),
            pools: Mutex::new(BTreeMap::new()),
            base_tiers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Add a pool and return its context for further configuration.
    pub fn add_pool(&self, pool_id: PoolId, name: &str) -> Arc<MockPool> {
        let pool = Arc::new(MockPool::new(pool_id, name));
        self.pools.lock().unwrap().insert(pool_id, Arc::clone(&pool));
        pool
    }

    pub fn remove_pool(&self, pool_id: PoolId) {
        self.pools.lock().unwrap().remove(&pool_id);
    }

    /// Mark a pool as a cache tier of `base_tier`.
    pub fn set_cache_tier(&self, pool_id: PoolId, base_tier: PoolId) {
        self.base_tiers.lock().unwrap().insert(pool_id, base_tier);
    }

    /// Make the next `connect` fail with the given message.
    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The configuration context the last `connect` received.
    pub fn last_context(&self) -> Option<ClusterContext> {
        self.last_context.lock().unwrap().clone()
    }

    pub fn pool(&self, pool_id: PoolId) -> Option<Arc<MockPool>> {
        self.pools.lock().unwrap().get(&pool_id).cloned()
    }
}

impl ClusterClient for MockCluster {
    fn connect<'a>(&'a self, ctx: &'a ClusterContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.connect_error.lock().unwrap().clone() {
                return Err(ReplayerError::Connect {
                    cluster: self.cluster_name.clone(),
                    message,
                });
            }
            *self.last_context.lock().unwrap() = Some(ctx.clone());
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn pool_list(&self) -> BoxFuture<'_, Vec<(PoolId, String)>> {
        Box::pin(async move {
            Ok(self
                .pools
                .lock()
                .unwrap()
                .values()
                .map(|pool| (pool.pool_id(), pool.pool_name().to_string()))
                .collect())
        })
    }

    fn pool_base_tier(&self, pool_id: PoolId) -> BoxFuture<'_, PoolId> {
        Box::pin(async move {
            if !self.pools.lock().unwrap().contains_key(&pool_id) {
                return Err(ReplayerError::not_found(format!("pool {pool_id}")));
            }
            Ok(self
                .base_tiers
                .lock()
                .unwrap()
                .get(&pool_id)
                .copied()
                .unwrap_or(pool_id))
        })
    }

    fn open_pool_by_id(&self, pool_id: PoolId) -> BoxFuture<'_, Arc<dyn PoolContext>> {
        Box::pin(async move {
            self.pools
                .lock()
                .unwrap()
                .get(&pool_id)
                .cloned()
                .map(|pool| pool as Arc<dyn PoolContext>)
                .ok_or_else(|| ReplayerError::not_found(format!("pool {pool_id}")))
        })
    }

    fn open_pool_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Arc<dyn PoolContext>> {
        Box::pin(async move {
            self.pools
                .lock()
                .unwrap()
                .values()
                .find(|pool| pool.pool_name() == name)
                .cloned()
                .map(|pool| pool as Arc<dyn PoolContext>)
                .ok_or_else(|| ReplayerError::not_found(format!("pool '{name}'")))
        })
    }
}

/// Mock implementation of `PoolContext`.
pub struct MockPool {
    pool_id: PoolId,
    name: String,
    mirror_mode: Mutex<MirrorMode>,
    mirror_uuid: Mutex<String>,
    fail_mirror_uuid: AtomicBool,
    fail_image_list: AtomicBool,
    /// image id -> global id
    mirror_images: Mutex<BTreeMap<String, String>>,
    /// image id -> name
    image_names: Mutex<BTreeMap<String, String>>,
    remove_down_calls: AtomicUsize,
    fail_remove_down: AtomicBool,
    fail_watch_register: AtomicBool,
    watch_registrations: AtomicUsize,
    active_watches: Arc<AtomicUsize>,
    fail_watch_unregister: Arc<AtomicBool>,
}

impl MockPool {
    fn new(pool_id: PoolId, name: &str) -> Self {
        Self {
            pool_id,
            name: name.to_string(),
            mirror_mode: Mutex::new(MirrorMode::Pool),
            mirror_uuid: Mutex::new(format!("uuid-{name}")),
            fail_mirror_uuid: AtomicBool::new(false),
            fail_image_list: AtomicBool::new(false),
            mirror_images: Mutex::new(BTreeMap::new()),
            image_names: Mutex::new(BTreeMap::new()),
            remove_down_calls: AtomicUsize::new(0),
            fail_remove_down: AtomicBool::new(false),
            fail_watch_register: AtomicBool::new(false),
            watch_registrations: AtomicUsize::new(0),
            active_watches: Arc::new(AtomicUsize::new(0)),
            fail_watch_unregister: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add an image to the pool's mirroring directory.
    pub fn add_mirror_image(&self, image_id: &str, global_id: &str, name: &str) {
        self.mirror_images
            .lock()
            .unwrap()
            .insert(image_id.to_string(), global_id.to_string());
        self.image_names
            .lock()
            .unwrap()
            .insert(image_id.to_string(), name.to_string());
    }

    /// Register an image in the directory without a resolvable name.
    pub fn add_unnamed_mirror_image(&self, image_id: &str, global_id: &str) {
        self.mirror_images
            .lock()
            .unwrap()
            .insert(image_id.to_string(), global_id.to_string());
    }

    pub fn set_mirror_mode(&self, mode: MirrorMode) {
        *self.mirror_mode.lock().unwrap() = mode;
    }

    pub fn set_mirror_uuid(&self, uuid: &str) {
        *self.mirror_uuid.lock().unwrap() = uuid.to_string();
    }

    pub fn fail_mirror_uuid(&self, fail: bool) {
        self.fail_mirror_uuid.store(fail, Ordering::SeqCst);
    }

    pub fn fail_image_list(&self, fail: bool) {
        self.fail_image_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_watch_register(&self, fail: bool) {
        self.fail_watch_register.store(fail, Ordering::SeqCst);
    }

    pub fn fail_watch_unregister(&self, fail: bool) {
        self.fail_watch_unregister.store(fail, Ordering::SeqCst);
    }

    pub fn fail_remove_down(&self, fail: bool) {
        self.fail_remove_down.store(fail, Ordering::SeqCst);
    }

    pub fn remove_down_calls(&self) -> usize {
        self.remove_down_calls.load(Ordering::SeqCst)
    }

    /// Total watch registrations over the pool's lifetime.
    pub fn watch_registrations(&self) -> usize {
        self.watch_registrations.load(Ordering::SeqCst)
    }

    /// Watches currently registered.
    pub fn active_watches(&self) -> usize {
        self.active_watches.load(Ordering::SeqCst)
    }
}

impl PoolContext for MockPool {
    fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    fn pool_name(&self) -> &str {
        &self.name
    }

    fn mirror_mode(&self) -> BoxFuture<'_, MirrorMode> {
        Box::pin(async move { Ok(*self.mirror_mode.lock().unwrap()) })
    }

    fn mirror_uuid(&self) -> BoxFuture<'_, String> {
        Box::pin(async move {
            if self.fail_mirror_uuid.load(Ordering::SeqCst) {
                return Err(ReplayerError::storage("mirror_uuid", "read failed"));
            }
            Ok(self.mirror_uuid.lock().unwrap().clone())
        })
    }

    fn mirror_image_list<'a>(
        &'a self,
        start_after: &'a str,
        max: usize,
    ) -> BoxFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move {
            if self.fail_image_list.load(Ordering::SeqCst) {
                return Err(ReplayerError::storage("mirror_image_list", "list failed"));
            }
            let images = self.mirror_images.lock().unwrap();
            let range = if start_after.is_empty() {
                images.range::<String, _>(..)
            } else {
                images.range::<str, _>((Bound::Excluded(start_after), Bound::Unbounded))
            };
            Ok(range
                .take(max)
                .map(|(id, global_id)| (id.clone(), global_id.clone()))
                .collect())
        })
    }

    fn image_name_by_id<'a>(&'a self, image_id: &'a str) -> BoxFuture<'a, String> {
        Box::pin(async move {
            self.image_names
                .lock()
                .unwrap()
                .get(image_id)
                .cloned()
                .ok_or_else(|| ReplayerError::not_found(format!("image name for {image_id}")))
        })
    }

    fn mirror_status_remove_down(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_remove_down.load(Ordering::SeqCst) {
                return Err(ReplayerError::storage(
                    "mirror_status_remove_down",
                    "write failed",
                ));
            }
            self.remove_down_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn watch_mirror_status(&self) -> BoxFuture<'_, Box<dyn StatusWatchHandle>> {
        Box::pin(async move {
            if self.fail_watch_register.load(Ordering::SeqCst) {
                return Err(ReplayerError::Watch {
                    pool_id: self.pool_id,
                    message: "register failed".to_string(),
                });
            }
            self.watch_registrations.fetch_add(1, Ordering::SeqCst);
            self.active_watches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockWatchHandle {
                active: Arc::clone(&self.active_watches),
                fail_unregister: Arc::clone(&self.fail_watch_unregister),
            }) as Box<dyn StatusWatchHandle>)
        })
    }
}

struct MockWatchHandle {
    active: Arc<AtomicUsize>,
    fail_unregister: Arc<AtomicBool>,
}

impl StatusWatchHandle for MockWatchHandle {
    fn oid(&self) -> &str {
        MIRRORING_OBJECT
    }

    fn unregister(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail_unregister.load(Ordering::SeqCst) {
                return Err(ReplayerError::Watch {
                    pool_id: 0,
                    message: "unregister failed".to_string(),
                });
            }
            Ok(())
        })
    }
}
