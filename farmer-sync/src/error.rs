//! Error types for the sync layer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations.
pub type FarmResult<T> = Result<T, FarmError>;

/// Result type for coordination-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for local resource operations.
pub type LocalResult<T> = Result<T, LocalError>;

/// Errors surfaced by a farm entry watcher.
///
/// Recoverable conditions (malformed local content, a disconnected store)
/// are handled inside the reconciliation loop and never show up here.
#[derive(Debug, Error)]
pub enum FarmError {
    /// A store failure not caused by disconnection.
    #[error("coordination store error: {0}")]
    Store(#[from] StoreError),

    /// Writing the local resource failed.
    #[error("local write failed: {0}")]
    LocalWrite(#[source] LocalError),

    /// The change notifier could not be set up.
    #[error("change notifier error: {0}")]
    Notifier(String),

    /// Invalid farm path, node name or payload.
    #[error(transparent)]
    Types(#[from] farmer_types::Error),

    /// The event queue was closed.
    #[error("event queue closed")]
    ChannelClosed,
}

/// Errors returned by a coordination-store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The client is not connected.
    #[error("connection lost")]
    ConnectionLoss,

    /// The session expired; ephemeral nodes are gone.
    #[error("session expired")]
    SessionExpired,

    #[error("no node at {0}")]
    NoNode(String),

    #[error("node already exists at {0}")]
    NodeExists(String),

    #[error("node {0} has children")]
    NotEmpty(String),

    #[error("not authorized to modify {0}")]
    NoAuth(String),

    #[error("invalid path {0:?}")]
    InvalidPath(String),
}

impl StoreError {
    /// Whether the failure is caused by a lost connection and will heal on
    /// reconnect.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionLoss | Self::SessionExpired)
    }
}

/// Errors returned by a local resource.
#[derive(Debug, Error)]
pub enum LocalError {
    /// The content could not be parsed.
    #[error("malformed content in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
