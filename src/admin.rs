//! Administrative command surface.
//!
//! Five verbs operate on a running replayer, each registered with the
//! daemon's command transport under the peer's cluster name:
//!
//! | Command | Effect |
//! |---|---|
//! | `rbd mirror status <peer>` | Structured or plain status document |
//! | `rbd mirror start <peer>` | Clear manual stop, start all workers |
//! | `rbd mirror stop <peer>` | Set manual stop, stop all workers |
//! | `rbd mirror restart <peer>` | Clear manual stop, restart all workers |
//! | `rbd mirror flush <peer>` | Flush all workers |
//!
//! Commands travel as [`AdminRequest`] messages into the supervisor task
//! and are therefore serialized with reconciliation; the transport awaits
//! the rendered output on the request's oneshot channel. Registration
//! failures are silently dropped so a partially registered peer keeps
//! operating.

use crate::config::PeerSpec;
use crate::supervisor::ReplayerState;
use crate::worker::WorkerStatus;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Tagged admin verbs. One enum replaces per-verb handler objects; the
/// supervisor dispatches on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Status,
    Start,
    Stop,
    Restart,
    Flush,
}

/// Registration table: every verb with its help prefix.
pub const COMMAND_TABLE: [(AdminCommand, &str, &str); 5] = [
    (AdminCommand::Status, "status", "get status for"),
    (AdminCommand::Start, "start", "start"),
    (AdminCommand::Stop, "stop", "stop"),
    (AdminCommand::Restart, "restart", "restart"),
    (AdminCommand::Flush, "flush", "flush"),
];

impl AdminCommand {
    /// Verb as it appears in the command name.
    pub fn verb(&self) -> &'static str {
        match self {
            AdminCommand::Status => "status",
            AdminCommand::Start => "start",
            AdminCommand::Stop => "stop",
            AdminCommand::Restart => "restart",
            AdminCommand::Flush => "flush",
        }
    }

    /// Full command name for a peer.
    pub fn command_name(&self, peer_cluster: &str) -> String {
        format!("rbd mirror {} {}", self.verb(), peer_cluster)
    }
}

/// Requested output rendering for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// Structured JSON document.
    Json,
}

/// One command in flight from the transport to the supervisor.
#[derive(Debug)]
pub struct AdminRequest {
    pub command: AdminCommand,
    pub format: OutputFormat,
    /// Receives the rendered output; dropped without a value when the
    /// replayer is already gone.
    pub responder: oneshot::Sender<String>,
}

/// Channel end the transport uses to submit commands.
pub type AdminSender = mpsc::UnboundedSender<AdminRequest>;

/// The daemon's command transport.
///
/// Implementations route incoming invocations of `name` to the supplied
/// sender. `register_command` fails when the name is already taken.
pub trait AdminRegistry: Send + Sync {
    fn register_command(
        &self,
        name: &str,
        help: &str,
        sender: AdminSender,
    ) -> std::result::Result<(), String>;

    fn unregister_command(&self, name: &str);
}

/// Registered command set for one peer. Unregisters on drop.
pub struct AdminSurface {
    registry: Arc<dyn AdminRegistry>,
    registered: Vec<String>,
}

impl AdminSurface {
    /// Register the full command table for `peer_cluster`.
    ///
    /// Commands that fail to register are dropped with a debug log; the
    /// peer continues to operate with whatever subset registered.
    pub fn register(
        registry: Arc<dyn AdminRegistry>,
        peer_cluster: &str,
        sender: AdminSender,
    ) -> Self {
        let mut registered = Vec::with_capacity(COMMAND_TABLE.len());
        for (command, verb, help_prefix) in COMMAND_TABLE {
            let name = command.command_name(peer_cluster);
            let help = format!("{help_prefix} rbd mirror {peer_cluster}");
            match registry.register_command(&name, &help, sender.clone()) {
                Ok(()) => registered.push(name),
                Err(reason) => {
                    debug!(command = %name, verb, reason = %reason, "admin command not registered");
                }
            }
        }
        Self {
            registry,
            registered,
        }
    }

    /// Unregister every command that registered. Idempotent.
    pub fn unregister(&mut self) {
        for name in self.registered.drain(..) {
            self.registry.unregister_command(&name);
        }
    }

    /// Names that registered successfully.
    pub fn registered_commands(&self) -> &[String] {
        &self.registered
    }
}

impl Drop for AdminSurface {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// The `status` command's document: the peer identity plus one entry per
/// supervised worker, collected in a single consistent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDocument {
    pub peer: String,
    pub image_replayers: Vec<WorkerStatus>,
}

impl StatusDocument {
    /// Snapshot worker statuses. The caller holds the supervisor lock.
    pub fn collect(peer: &PeerSpec, state: &ReplayerState) -> Self {
        Self {
            peer: peer.to_string(),
            image_replayers: state.workers().map(|w| w.status()).collect(),
        }
    }

    /// Render in the requested format.
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(self).unwrap_or_else(|e| {
                    format!("{{\"error\": \"status serialization failed: {e}\"}}")
                })
            }
            OutputFormat::Plain => {
                let mut out = String::new();
                let _ = writeln!(out, "peer: {}", self.peer);
                let _ = writeln!(out, "image replayers:");
                for status in &self.image_replayers {
                    let _ = writeln!(
                        out,
                        "  {}: state={} pool={} image={}",
                        status.global_image_id,
                        status.state,
                        status.local_pool_id,
                        status.local_image_name
                    );
                }
                out
            }
        }
    }
}
