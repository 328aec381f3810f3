//! Role policies.
//!
//! The engine is shared; what differs between a joiner and an importer is
//! captured by [`EntryRole`]: how payloads are normalized, when local data is
//! pushed, what a remote delivery does locally, and who wins on reconnect.

use crate::error::FarmResult;
use crate::local::LocalResource;
use crate::state::LocalSnapshot;
use async_trait::async_trait;
use farmer_types::{EntryIdentity, EntryPayload};

/// When local reads are pushed to the remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushPolicy {
    /// Every read that differs from the remote record is pushed.
    Always,
    /// Local data is pushed only to create a missing record.
    CreateOnly,
}

/// What happens to the remote record on a lost→connected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Recreate it from the current local snapshot, whatever the remote holds.
    Recreate,
    /// Create it only if absent, then adopt the remote content.
    EnsureExists,
}

/// Local side handed to [`EntryRole::apply_remote`].
pub struct LocalSide<'a> {
    pub resource: &'a dyn LocalResource,
    pub snapshot: &'a mut LocalSnapshot,
}

/// Behavior of one kind of farm entry watcher.
#[async_trait]
pub trait EntryRole: Send + Sync + 'static {
    /// The entry this role manages.
    fn identity(&self) -> &EntryIdentity;

    /// Adjusts a payload before it is compared or written anywhere.
    fn normalize(&self, payload: EntryPayload) -> EntryPayload;

    /// Whether the role writes the local resource at all.
    fn writes_local(&self) -> bool;

    fn push_policy(&self) -> PushPolicy;

    fn reconnect_policy(&self) -> ReconnectPolicy;

    /// Handles remote content that is not an echo of our own writes.
    ///
    /// Returns whether the local resource was written.
    async fn apply_remote(&self, delivered: EntryPayload, local: LocalSide<'_>) -> FarmResult<bool>;
}
