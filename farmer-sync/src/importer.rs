//! Importer role: publishes a local resource without ever modifying it.

use crate::config::WatcherConfig;
use crate::error::FarmResult;
use crate::role::{EntryRole, LocalSide, PushPolicy, ReconnectPolicy};
use crate::watcher::{EntryBindings, FarmEntryWatcher};
use async_trait::async_trait;
use farmer_types::{EntryIdentity, EntryPayload, FarmPath, HostIdentity};
use tracing::trace;

/// A watcher that imports a local resource into a farm.
pub type FarmImporter = FarmEntryWatcher<ImporterRole>;

/// Pushes local content to the host's ephemeral record. Remote changes are
/// only tracked for echo suppression.
#[derive(Debug, Clone)]
pub struct ImporterRole {
    identity: EntryIdentity,
}

impl ImporterRole {
    pub fn new(host: &HostIdentity) -> FarmResult<Self> {
        Ok(Self {
            identity: host.private_entry()?,
        })
    }
}

#[async_trait]
impl EntryRole for ImporterRole {
    fn identity(&self) -> &EntryIdentity {
        &self.identity
    }

    fn normalize(&self, payload: EntryPayload) -> EntryPayload {
        payload
    }

    fn writes_local(&self) -> bool {
        false
    }

    fn push_policy(&self) -> PushPolicy {
        PushPolicy::Always
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::Recreate
    }

    async fn apply_remote(&self, delivered: EntryPayload, _local: LocalSide<'_>) -> FarmResult<bool> {
        trace!(payload = %delivered, "Remote change not applied locally");
        Ok(false)
    }
}

impl FarmImporter {
    /// Imports into `farm` under the host identity resolved from `config`.
    pub async fn import(
        farm: FarmPath,
        bindings: EntryBindings,
        config: WatcherConfig,
    ) -> FarmResult<Self> {
        let role = ImporterRole::new(&config.host_identity())?;
        Self::start(role, farm, bindings, config).await
    }
}
