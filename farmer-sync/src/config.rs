//! Watcher configuration.

use farmer_types::HostIdentity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default payload key carrying the owning host's name.
pub const DEFAULT_HOSTNAME_FIELD: &str = "hostname";

/// Configuration shared by joiners and importers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Overrides the resolved host address used as the private node name.
    pub node_name: Option<String>,
    /// Overrides the resolved host name injected into private payloads.
    pub hostname: Option<String>,
    /// Payload key receiving the host name.
    pub hostname_field: String,
    /// How long `run_until_idle` waits for the next event (ms).
    pub idle_timeout_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            node_name: None,
            hostname: None,
            hostname_field: DEFAULT_HOSTNAME_FIELD.to_string(),
            idle_timeout_ms: 100,
        }
    }
}

impl WatcherConfig {
    /// Resolves the host identity, honoring overrides.
    pub fn host_identity(&self) -> HostIdentity {
        HostIdentity::resolve(self.node_name.as_deref(), self.hostname.as_deref())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
