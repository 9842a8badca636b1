//! Configuration for the mirror replayer.
//!
//! Two layers live here:
//!
//! - [`PeerSpec`] and [`ReplayerOptions`]: what the daemon hands to
//!   [`MirrorReplayer::new()`](crate::MirrorReplayer::new). Can be
//!   constructed programmatically or deserialized from YAML/JSON.
//! - [`ClusterContext`]: the per-peer configuration context built during
//!   `init`. Values are applied in a fixed order (peer parameters, then the
//!   process environment, then `extra_args`), and the image read cache is
//!   force-disabled afterwards since journal tail workers bypass caching.
//!
//! # Quick Start
//!
//! ```rust
//! use mirror_replayer::config::{PeerSpec, ReplayerOptions};
//!
//! let peer = PeerSpec {
//!     cluster_name: "site-b".into(),
//!     client_name: "client.mirror".into(),
//!     ..Default::default()
//! };
//! let options = ReplayerOptions::default();
//! assert_eq!(options.poll_interval_duration().as_secs(), 30);
//! # let _ = peer;
//! ```

use crate::error::{ReplayerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Environment variable holding extra configuration arguments, parsed
/// between the peer parameters and the explicit `extra_args`.
pub const ENV_ARGS: &str = "RBD_MIRROR_ARGS";

/// Configuration key forced to `false` for every peer context.
const IMAGE_CACHE_KEY: &str = "rbd_cache";

// ═══════════════════════════════════════════════════════════════════════════════
// PeerSpec: identity of the remote cluster
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of the remote cluster paired with the local one.
///
/// Immutable after construction. The `cluster_name` doubles as the peer's
/// admin command suffix (`rbd mirror status <cluster_name>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSpec {
    /// Stable identifier of the peering relationship.
    #[serde(default)]
    pub uuid: String,

    /// Remote cluster name (also the `cluster` configuration value).
    pub cluster_name: String,

    /// Client identity to authenticate as, e.g. `client.mirror`.
    pub client_name: String,

    /// Arbitrary cluster parameters applied before environment and args.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for PeerSpec {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            cluster_name: "remote".to_string(),
            client_name: "client.admin".to_string(),
            params: BTreeMap::new(),
        }
    }
}

impl PeerSpec {
    /// Create a minimal peer spec for testing.
    pub fn for_testing(cluster_name: &str) -> Self {
        Self {
            uuid: format!("uuid-{cluster_name}"),
            cluster_name: cluster_name.to_string(),
            client_name: "client.mirror".to_string(),
            params: BTreeMap::new(),
        }
    }
}

impl fmt::Display for PeerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster_name, self.client_name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplayerOptions: supervisor tunables
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunable parameters for the supervisor loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayerOptions {
    /// Reconciliation deadline as a duration string (e.g. `"30s"`).
    /// Doubles as the discovery period; the pool watcher can wake the loop
    /// earlier.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Interval between drain reconciliations during shutdown.
    #[serde(default = "default_drain_interval")]
    pub drain_interval: String,
}

fn default_poll_interval() -> String {
    "30s".to_string()
}

fn default_drain_interval() -> String {
    "1s".to_string()
}

impl Default for ReplayerOptions {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            drain_interval: default_drain_interval(),
        }
    }
}

impl ReplayerOptions {
    /// Short intervals so tests do not wait on wall-clock deadlines.
    pub fn for_testing() -> Self {
        Self {
            poll_interval: "25ms".to_string(),
            drain_interval: "5ms".to_string(),
        }
    }

    /// Parse `poll_interval` to a Duration, falling back to 30 seconds.
    pub fn poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(30))
    }

    /// Parse `drain_interval` to a Duration, falling back to 1 second.
    pub fn drain_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.drain_interval).unwrap_or(Duration::from_secs(1))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ClientIdentity
// ═══════════════════════════════════════════════════════════════════════════════

/// Entity types a client identity may carry.
const ENTITY_TYPES: &[&str] = &["client", "mon", "osd", "mds", "mgr", "rgw"];

/// Parsed client identity, `type.id` or a bare id defaulting to `client`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub entity_type: String,
    pub id: String,
}

impl ClientIdentity {
    /// Parse an identity string like `client.mirror` or `mirror`.
    ///
    /// Fails on an empty string, an unknown entity type, or an empty id.
    pub fn parse(peer: &str, s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ReplayerError::InvalidClientId {
                peer: peer.to_string(),
                message: "empty client name".to_string(),
            });
        }
        match s.split_once('.') {
            Some((entity_type, id)) => {
                if !ENTITY_TYPES.contains(&entity_type) {
                    return Err(ReplayerError::InvalidClientId {
                        peer: peer.to_string(),
                        message: format!("unknown entity type '{entity_type}'"),
                    });
                }
                if id.is_empty() {
                    return Err(ReplayerError::InvalidClientId {
                        peer: peer.to_string(),
                        message: "empty entity id".to_string(),
                    });
                }
                Ok(Self {
                    entity_type: entity_type.to_string(),
                    id: id.to_string(),
                })
            }
            None => Ok(Self {
                entity_type: "client".to_string(),
                id: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity_type, self.id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ClusterContext: per-peer configuration context
// ═══════════════════════════════════════════════════════════════════════════════

/// Owned configuration context for one peer's remote cluster handle.
///
/// No process-wide state: each supervisor builds and owns its own context.
#[derive(Debug, Clone)]
pub struct ClusterContext {
    /// Remote cluster name.
    pub cluster: String,
    /// Authenticated entity.
    pub entity: ClientIdentity,
    values: BTreeMap<String, String>,
}

impl ClusterContext {
    /// Build the context for a peer, seeding values from its parameters.
    ///
    /// Fails with an invalid-identity error when the peer's client name
    /// does not parse.
    pub fn new(peer: &PeerSpec) -> Result<Self> {
        let entity = ClientIdentity::parse(&peer.cluster_name, &peer.client_name)?;
        let mut ctx = Self {
            cluster: peer.cluster_name.clone(),
            entity,
            values: BTreeMap::new(),
        };
        for (key, value) in &peer.params {
            ctx.set(key, value);
        }
        Ok(ctx)
    }

    /// Apply arguments from the [`ENV_ARGS`] environment variable.
    ///
    /// The variable holds whitespace-separated `--key[=value]` tokens in
    /// the same format as `extra_args`.
    pub fn apply_env(&mut self) -> Result<()> {
        match std::env::var(ENV_ARGS) {
            Ok(raw) => {
                let args: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
                self.apply_args(&args)
            }
            Err(std::env::VarError::NotPresent) => Ok(()),
            Err(e) => Err(ReplayerError::Config(format!(
                "could not read {ENV_ARGS}: {e}"
            ))),
        }
    }

    /// Apply an ordered argument sequence.
    ///
    /// Accepts `--key=value` and `--key value` forms. Rejects tokens that
    /// do not start with `--` and flags missing their value.
    pub fn apply_args(&mut self, args: &[String]) -> Result<()> {
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let Some(stripped) = arg.strip_prefix("--") else {
                return Err(ReplayerError::Config(format!(
                    "unexpected argument '{arg}'"
                )));
            };
            if stripped.is_empty() {
                return Err(ReplayerError::Config("empty argument".to_string()));
            }
            if let Some((key, value)) = stripped.split_once('=') {
                self.set(key, value);
            } else {
                match iter.next() {
                    Some(value) => self.set(stripped, value),
                    None => {
                        return Err(ReplayerError::Config(format!(
                            "missing value for '--{stripped}'"
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Set a configuration value. Keys are normalized (`-` becomes `_`).
    pub fn set(&mut self, key: &str, value: &str) {
        self.values
            .insert(key.replace('-', "_"), value.to_string());
    }

    /// Look up a configuration value by normalized key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.replace('-', "_")).map(String::as_str)
    }

    /// Force-disable the local image read cache.
    ///
    /// Journal tail workers bypass caching, so the cache would only hold
    /// stale data.
    pub fn disable_image_cache(&mut self) {
        self.set(IMAGE_CACHE_KEY, "false");
    }
}
