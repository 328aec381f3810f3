//! Coordination store abstraction.
//!
//! The engine only relies on the operation contracts below: a hierarchical
//! namespace of versioned nodes, ephemeral nodes bound to the client session,
//! persistent data watches and connection-state notifications. Any client
//! (a networked one, or the in-process [`memory::MemoryStore`]) plugs in by
//! implementing [`CoordinationClient`].

pub mod memory;

use crate::error::StoreResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifier of a store session.
pub type SessionId = u64;

/// Node metadata returned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStat {
    /// Data version, bumped on every `set`. Starts at 0.
    pub version: i32,
    /// Transaction that created this node incarnation.
    pub created: u64,
    /// Transaction that last modified the node.
    pub modified: u64,
    /// Owning session for ephemeral nodes.
    pub ephemeral_owner: Option<SessionId>,
}

impl NodeStat {
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner.is_some()
    }
}

/// Connection state transitions reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    /// The session is gone; ephemeral nodes were destroyed and watches dropped.
    Lost,
}

/// A data watch delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEvent {
    /// Watched node path.
    pub path: String,
    /// Transaction that produced this state.
    pub txid: u64,
    /// Current content, or `None` if the node does not exist.
    pub data: Option<(Vec<u8>, NodeStat)>,
}

/// Callback receiving data watch deliveries.
pub type DataListener = Arc<dyn Fn(DataEvent) + Send + Sync>;

/// Callback receiving connection state transitions.
pub type ConnectionListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Client of a hierarchical coordination store.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Current session, or `None` while disconnected.
    fn session_id(&self) -> Option<SessionId>;

    /// Creates every missing node along `path` as an empty persistent node.
    async fn ensure_path(&self, path: &str) -> StoreResult<()>;

    /// Creates a node. Fails with `NodeExists` if it already exists and with
    /// `NoNode` if its parent does not.
    async fn create(&self, path: &str, data: &[u8], ephemeral: bool) -> StoreResult<NodeStat>;

    /// Replaces the data of an existing node.
    async fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat>;

    /// Reads a node.
    async fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)>;

    /// Returns the node's metadata if it exists.
    async fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>>;

    /// Deletes a childless node.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Registers a data watch on `path`.
    ///
    /// The listener fires once right away with the current state, then after
    /// every change of the node (including creation and deletion). The watch
    /// lives as long as the current session.
    async fn watch_data(&self, path: &str, listener: DataListener) -> StoreResult<()>;

    /// Registers a listener for connection state transitions.
    fn add_connection_listener(&self, listener: ConnectionListener);
}
