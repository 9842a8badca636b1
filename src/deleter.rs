//! Image deleter integration.
//!
//! The deleter is a shared collaborator with its own durable queue and
//! retry logic; the supervisor only schedules deletions and gates worker
//! starts on pending deletions of the same image name.
//!
//! Both operations are synchronous fire-and-forget: the deleter completes
//! work on its own runtime and reports through the supplied callback. The
//! supervisor invokes them while holding the supervisor lock, so
//! implementations must not block.
//!
//! The supervisor holds its strong reference in a [`DeleterSlot`] and
//! releases it before entering the shutdown drain so the deleter can
//! quiesce independently; stop-completion hooks firing after the release
//! become no-ops.

use crate::error::Result;
use crate::types::PoolId;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Completion for a deletion-gated start. `Ok` means safe to proceed; an
/// error means the gate should be re-armed.
pub type DeletionCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Durable queue of pending image deletions.
pub trait ImageDeleter: Send + Sync {
    /// Schedule deletion of a local image. Fire-and-forget.
    fn schedule_image_delete(
        &self,
        pool_id: PoolId,
        image_id: &str,
        image_name: &str,
        global_image_id: &str,
    );

    /// Wait until no deletion is pending for `image_name`, then invoke
    /// `on_finish`.
    ///
    /// With `retry_on_error` false the deleter reports a failed deletion
    /// attempt through the callback instead of retrying internally; the
    /// caller decides whether to re-arm.
    fn wait_for_scheduled_deletion(
        &self,
        image_name: &str,
        on_finish: DeletionCallback,
        retry_on_error: bool,
    );
}

/// A no-op deleter for testing/standalone mode.
///
/// Logs schedule calls and reports every gate as immediately clear.
#[derive(Clone, Default)]
pub struct NoOpImageDeleter;

impl ImageDeleter for NoOpImageDeleter {
    fn schedule_image_delete(
        &self,
        pool_id: PoolId,
        image_id: &str,
        image_name: &str,
        global_image_id: &str,
    ) {
        debug!(
            pool_id,
            image_id,
            image_name,
            global_image_id,
            "NoOp: would schedule image deletion"
        );
    }

    fn wait_for_scheduled_deletion(
        &self,
        image_name: &str,
        on_finish: DeletionCallback,
        _retry_on_error: bool,
    ) {
        debug!(image_name, "NoOp: no deletion pending");
        on_finish(Ok(()));
    }
}

/// Holder for the supervisor's strong reference to the deleter.
///
/// Cloneable so the synchronous stop-completion hooks can consult it
/// without touching supervisor state. [`release()`](Self::release) clears
/// the reference when the loop transitions to draining; `get()` afterwards
/// returns `None` and dependent hooks become no-ops.
#[derive(Clone)]
pub struct DeleterSlot {
    inner: Arc<Mutex<Option<Arc<dyn ImageDeleter>>>>,
}

impl DeleterSlot {
    pub fn new(deleter: Arc<dyn ImageDeleter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(deleter))),
        }
    }

    /// Current deleter reference, if not yet released.
    pub fn get(&self) -> Option<Arc<dyn ImageDeleter>> {
        self.inner.lock().expect("deleter slot poisoned").clone()
    }

    /// Drop the strong reference. Idempotent.
    pub fn release(&self) {
        self.inner.lock().expect("deleter slot poisoned").take();
    }
}
