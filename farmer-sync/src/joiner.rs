//! Joiner role: two-way sync between a local resource and a farm entry.

use crate::config::WatcherConfig;
use crate::error::{FarmError, FarmResult};
use crate::role::{EntryRole, LocalSide, PushPolicy, ReconnectPolicy};
use crate::watcher::{EntryBindings, FarmEntryWatcher};
use async_trait::async_trait;
use farmer_types::{EntryIdentity, EntryPayload, FarmPath, HostIdentity};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Called with no arguments after remote content was written locally.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// A watcher that joins a farm.
pub type FarmJoiner = FarmEntryWatcher<JoinerRole>;

/// Pulls remote changes into the local resource and pushes local changes out.
///
/// In private mode the host's own ephemeral record is kept in sync and the
/// local resource is authoritative. In common mode the shared persistent
/// record is authoritative once it exists.
pub struct JoinerRole {
    identity: EntryIdentity,
    hostname: String,
    hostname_field: String,
    on_update: Option<UpdateCallback>,
}

impl JoinerRole {
    /// Creates the role for `host`, in common mode if `common` is set.
    pub fn new(host: &HostIdentity, common: bool, config: &WatcherConfig) -> FarmResult<Self> {
        let identity = if common {
            EntryIdentity::Common
        } else {
            host.private_entry()?
        };
        Ok(Self {
            identity,
            hostname: host.hostname.clone(),
            hostname_field: config.hostname_field.clone(),
            on_update: None,
        })
    }

    /// Sets the callback fired after each local write of remote content.
    #[must_use]
    pub fn with_callback(mut self, on_update: UpdateCallback) -> Self {
        self.on_update = Some(on_update);
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Debug for JoinerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinerRole")
            .field("identity", &self.identity)
            .field("hostname", &self.hostname)
            .field("hostname_field", &self.hostname_field)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

#[async_trait]
impl EntryRole for JoinerRole {
    fn identity(&self) -> &EntryIdentity {
        &self.identity
    }

    fn normalize(&self, payload: EntryPayload) -> EntryPayload {
        if self.identity.injects_hostname() {
            payload.with_field(self.hostname_field.as_str(), self.hostname.as_str())
        } else {
            payload
        }
    }

    fn writes_local(&self) -> bool {
        true
    }

    fn push_policy(&self) -> PushPolicy {
        if self.identity.is_common() {
            PushPolicy::CreateOnly
        } else {
            PushPolicy::Always
        }
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        if self.identity.is_common() {
            ReconnectPolicy::EnsureExists
        } else {
            ReconnectPolicy::Recreate
        }
    }

    async fn apply_remote(&self, delivered: EntryPayload, local: LocalSide<'_>) -> FarmResult<bool> {
        let incoming = self.normalize(delivered);
        if local.snapshot.payload() == Some(&incoming) {
            debug!("Local resource already matches remote content");
            return Ok(false);
        }

        local
            .resource
            .write(&incoming)
            .await
            .map_err(FarmError::LocalWrite)?;
        info!(payload = %incoming, "Applied remote change to local resource");
        local.snapshot.record_write(incoming);

        if let Some(on_update) = &self.on_update {
            on_update();
        }
        Ok(true)
    }
}

impl FarmJoiner {
    /// Joins `farm`: resolves the host identity from `config` and starts the
    /// watcher.
    pub async fn join(
        farm: FarmPath,
        bindings: EntryBindings,
        common: bool,
        on_update: Option<UpdateCallback>,
        config: WatcherConfig,
    ) -> FarmResult<Self> {
        let host = config.host_identity();
        let mut role = JoinerRole::new(&host, common, &config)?;
        if let Some(on_update) = on_update {
            role = role.with_callback(on_update);
        }
        Self::start(role, farm, bindings, config).await
    }
}
