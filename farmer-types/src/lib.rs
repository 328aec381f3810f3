//! Core type definitions for farm membership sync.
//!
//! This crate defines the plain data types shared by the sync engine:
//! - Farm paths in the coordination store's hierarchical namespace
//! - Entry identities (a host's private record or the farm-wide common one)
//! - The resolved identity of the running host
//! - Entry payloads with canonical-JSON equality
//!
//! Nothing here performs I/O beyond resolving the host identity once.

mod identity;
mod path;
mod payload;

pub use identity::{COMMON_NODE, EntryIdentity, HostIdentity};
pub use path::FarmPath;
pub use payload::EntryPayload;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid farm path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid node name {0:?}")]
    InvalidNodeName(String),

    #[error("payload must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}
