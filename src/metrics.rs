//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Reconciliation ticks
//! - Worker lifecycle (created/started/stopped)
//! - Scheduled deletions
//! - Status watch counts
//! - Admin command usage
//! - Supervisor phase
//!
//! All metrics are prefixed with `mirror_replayer_` and follow Prometheus
//! conventions: counters end in `_total`, gauges represent current state.

use metrics::{counter, gauge};

/// Record one reconciliation tick.
pub fn record_reconcile_tick() {
    counter!("mirror_replayer_reconcile_ticks_total").increment(1);
}

/// Record creation of a new image replayer.
pub fn record_worker_created() {
    counter!("mirror_replayer_workers_created_total").increment(1);
}

/// Record a start request issued to an image replayer.
pub fn record_worker_started() {
    counter!("mirror_replayer_workers_started_total").increment(1);
}

/// Record a stop request issued to an image replayer.
pub fn record_worker_stopped() {
    counter!("mirror_replayer_workers_stopped_total").increment(1);
}

/// Record a deletion handed to the image deleter.
pub fn record_deletion_scheduled() {
    counter!("mirror_replayer_deletions_scheduled_total").increment(1);
}

/// Record one admin command invocation by verb.
pub fn record_admin_command(verb: &str) {
    counter!("mirror_replayer_admin_commands_total", "verb" => verb.to_string()).increment(1);
}

/// Record the number of images found by the bootstrap scan.
pub fn record_bootstrap_images(count: usize) {
    counter!("mirror_replayer_bootstrap_images_total").increment(count as u64);
}

/// Current number of supervised workers.
pub fn set_worker_count(count: usize) {
    gauge!("mirror_replayer_workers").set(count as f64);
}

/// Current number of open status watches.
pub fn set_status_watch_count(count: usize) {
    gauge!("mirror_replayer_status_watches").set(count as f64);
}

/// Current supervisor phase.
pub fn set_phase(phase: &str) {
    gauge!("mirror_replayer_phase", "phase" => phase.to_string()).set(1.0);
}
