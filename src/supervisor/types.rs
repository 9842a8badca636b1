//! Supervisor phase and event types.
//!
//! # Phase Transitions
//!
//! ```text
//!                 init()
//! Created ──────────────────► Running ◄──────────┐
//!                                │               │ admin start/restart
//!                     admin stop │               │
//!                                ▼               │
//!                          ManualStopped ────────┘
//!                                │
//!              shutdown() ───────┤ (from Running too)
//!                                ▼
//!                            Draining
//!                                │ (images empty)
//!                                ▼
//!                            Terminated
//! ```
//!
//! While `ManualStopped`, reconciliation is skipped entirely: the set of
//! supervised pools and images does not change as a function of target-set
//! changes until an admin `start` or `restart` clears the flag.

use crate::admin::AdminRequest;
use crate::error::Result;
use crate::types::PoolId;

/// Phase of the supervisor's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// Constructed, `init()` not yet called.
    Created,
    /// Reconciling against the pool watcher's target set.
    Running,
    /// Admin `stop` received; membership frozen until `start`/`restart`.
    ManualStopped,
    /// Shutdown requested; reconciling against an empty target until all
    /// workers report stopped.
    Draining,
    /// Drain complete; the loop has exited.
    Terminated,
}

impl std::fmt::Display for SupervisorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorPhase::Created => write!(f, "Created"),
            SupervisorPhase::Running => write!(f, "Running"),
            SupervisorPhase::ManualStopped => write!(f, "ManualStopped"),
            SupervisorPhase::Draining => write!(f, "Draining"),
            SupervisorPhase::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Messages consumed by the supervisor task.
///
/// Periodic ticks and shutdown arrive through dedicated timer/watch
/// channels; these are the payload-carrying events.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// An admin command from the registered transport.
    Admin(AdminRequest),

    /// A deletion gate for a pending worker start has resolved.
    ///
    /// `Ok` starts the worker; an error re-arms the gate. Replaces the
    /// nested completion closures of earlier designs: the waiting state
    /// lives in the deleter, and resolution is an explicit message.
    DeletionGateResolved {
        pool_id: PoolId,
        image_id: String,
        image_name: String,
        result: Result<()>,
    },
}
