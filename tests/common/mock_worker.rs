//! Mock image replayer and factory.
//!
//! Workers record every lifecycle call. Stops complete immediately by
//! default; with `defer_stops` the worker parks in `Stopping` until the
//! test calls [`MockWorker::complete_stop`], modelling stops that span
//! reconciliation ticks.

use mirror_replayer::{
    ImageReplayerFactory, ImageReplayerHandle, LifecycleCallback, PoolId, WorkerParams,
    WorkerState, WorkerStatus,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockWorker {
    pub params: WorkerParams,
    state: Mutex<WorkerState>,
    local_image_name: Mutex<String>,
    defer_stop: AtomicBool,
    pending_stop: Mutex<Option<LifecycleCallback>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    restart_calls: AtomicUsize,
    flush_calls: AtomicUsize,
    manual_starts: AtomicUsize,
    manual_stops: AtomicUsize,
}

impl MockWorker {
    pub fn new(params: WorkerParams, defer_stop: bool) -> Self {
        let local_image_name = format!("{}-name", params.image_id);
        Self {
            params,
            state: Mutex::new(WorkerState::Stopped),
            local_image_name: Mutex::new(local_image_name),
            defer_stop: AtomicBool::new(defer_stop),
            pending_stop: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            restart_calls: AtomicUsize::new(0),
            flush_calls: AtomicUsize::new(0),
            manual_starts: AtomicUsize::new(0),
            manual_stops: AtomicUsize::new(0),
        }
    }

    /// Finish a deferred stop: transition to `Stopped` and fire the
    /// completion hook.
    pub fn complete_stop(&self) {
        *self.state.lock().unwrap() = WorkerState::Stopped;
        if let Some(callback) = self.pending_stop.lock().unwrap().take() {
            callback(Ok(()));
        }
    }

    pub fn set_local_image_name(&self, name: &str) {
        *self.local_image_name.lock().unwrap() = name.to_string();
    }

    pub fn force_state(&self, state: WorkerState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn restart_calls(&self) -> usize {
        self.restart_calls.load(Ordering::SeqCst)
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub fn manual_starts(&self) -> usize {
        self.manual_starts.load(Ordering::SeqCst)
    }

    pub fn manual_stops(&self) -> usize {
        self.manual_stops.load(Ordering::SeqCst)
    }
}

impl ImageReplayerHandle for MockWorker {
    fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    fn start(&self, on_finish: Option<LifecycleCallback>, manual: bool) {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if manual {
            self.manual_starts.fetch_add(1, Ordering::SeqCst);
        }
        {
            let mut state = self.state.lock().unwrap();
            if *state == WorkerState::Stopped {
                *state = WorkerState::Running;
            }
        }
        if let Some(callback) = on_finish {
            callback(Ok(()));
        }
    }

    fn stop(&self, on_finish: Option<LifecycleCallback>, manual: bool) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if manual {
            self.manual_stops.fetch_add(1, Ordering::SeqCst);
        }

        if self.state() == WorkerState::Stopped {
            if let Some(callback) = on_finish {
                callback(Ok(()));
            }
            return;
        }

        if self.defer_stop.load(Ordering::SeqCst) {
            *self.state.lock().unwrap() = WorkerState::Stopping;
            if let Some(callback) = on_finish {
                *self.pending_stop.lock().unwrap() = Some(callback);
            }
        } else {
            *self.state.lock().unwrap() = WorkerState::Stopped;
            if let Some(callback) = on_finish {
                callback(Ok(()));
            }
        }
    }

    fn restart(&self) {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = WorkerState::Running;
    }

    fn flush(&self) {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            state: self.state().to_string(),
            local_pool_id: self.local_pool_id(),
            local_image_id: self.local_image_id(),
            local_image_name: self.local_image_name(),
            global_image_id: self.global_image_id(),
        }
    }

    fn local_pool_id(&self) -> PoolId {
        self.params.local_pool_id
    }

    fn local_image_id(&self) -> String {
        self.params.image_id.clone()
    }

    fn local_image_name(&self) -> String {
        self.local_image_name.lock().unwrap().clone()
    }

    fn global_image_id(&self) -> String {
        self.params.global_image_id.clone()
    }
}

/// Factory recording every worker it creates.
#[derive(Default)]
pub struct MockWorkerFactory {
    defer_stops: AtomicBool,
    created: Mutex<Vec<Arc<MockWorker>>>,
}

impl MockWorkerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// New workers park in `Stopping` on stop until `complete_stop`.
    pub fn defer_stops(&self, defer: bool) {
        self.defer_stops.store(defer, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<MockWorker>> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Most recent worker created for `(remote_pool_id, image_id)`.
    pub fn worker_for(&self, remote_pool_id: PoolId, image_id: &str) -> Option<Arc<MockWorker>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|worker| {
                worker.params.remote_pool_id == remote_pool_id
                    && worker.params.image_id == image_id
            })
            .cloned()
    }
}

impl ImageReplayerFactory for MockWorkerFactory {
    fn create(&self, params: WorkerParams) -> Arc<dyn ImageReplayerHandle> {
        let worker = Arc::new(MockWorker::new(
            params,
            self.defer_stops.load(Ordering::SeqCst),
        ));
        self.created.lock().unwrap().push(Arc::clone(&worker));
        worker
    }
}
