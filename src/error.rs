// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the mirror replayer.
//!
//! Errors are categorized by their source (peer configuration, remote
//! cluster, pool metadata, status watches) and include context to help with
//! debugging.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `InvalidClientId` | No | Peer client identity unparseable |
//! | `Config` | No | Configuration/environment/argument parse failure |
//! | `Connect` | No | Remote cluster unreachable at init |
//! | `Storage` | Yes | Pool open, list, or metadata read failed |
//! | `NotFound` | No | Pool or object missing (used for flow control) |
//! | `Watch` | Yes | Status watch register/unregister failed |
//! | `WorkerLifecycle` | No | Reported by an image replayer completion |
//! | `Shutdown` | No | Replayer is shutting down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Retryable errors are per-pool, per-tick: the control loop logs them,
//! skips the pool, and retries on the next reconciliation. Non-retryable
//! errors from `init` are propagated to the caller.

use thiserror::Error;

/// Result type alias for replayer operations.
pub type Result<T> = std::result::Result<T, ReplayerError>;

/// Errors that can occur while supervising a peer's image replayers.
///
/// Use [`is_retryable()`](Self::is_retryable) to check if the operation
/// should be retried on a later tick.
#[derive(Error, Debug)]
pub enum ReplayerError {
    /// Peer client identity could not be parsed.
    ///
    /// Propagated from `init`; the peer configuration must be fixed.
    #[error("invalid client identity for peer {peer}: {message}")]
    InvalidClientId { peer: String, message: String },

    /// Configuration, environment, or argument parse failure.
    ///
    /// Propagated from `init`; fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote cluster unreachable.
    ///
    /// Propagated from `init` with the transport's message.
    #[error("error connecting to remote cluster {cluster}: {message}")]
    Connect { cluster: String, message: String },

    /// Pool open, list, or metadata read failed.
    ///
    /// Retryable: the reconciler logs it, skips the pool for this tick,
    /// and retries on the next one.
    #[error("storage error ({operation}): {message}")]
    Storage { operation: String, message: String },

    /// A pool or object does not exist.
    ///
    /// Distinct from [`Storage`](Self::Storage) because several code paths
    /// branch on it: the bootstrap keys its residue by the local pool id
    /// when the remote pool lookup reports NotFound.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Status watch register/unregister failed.
    ///
    /// Register failure aborts worker creation in that pool for this tick.
    /// Unregister failure is logged only.
    #[error("status watch error (pool {pool_id}): {message}")]
    Watch { pool_id: i64, message: String },

    /// Reported by an image replayer through its completion.
    ///
    /// Surfaced via the `status` admin command, not propagated.
    #[error("image replayer error ({global_image_id}): {message}")]
    WorkerLifecycle {
        global_image_id: String,
        message: String,
    },

    /// Shutdown in progress.
    #[error("shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplayerError {
    /// Create a storage error with an operation label.
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a NotFound error naming the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Check if this error is retryable on a later tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { .. } => true,
            Self::Watch { .. } => true,
            Self::InvalidClientId { .. } => false,
            Self::Config(_) => false,
            Self::Connect { .. } => false,
            Self::NotFound { .. } => false,
            Self::WorkerLifecycle { .. } => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error signals a missing pool or object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
