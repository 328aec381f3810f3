//! Farm entry sync engine.
//!
//! Keeps a local JSON resource and a farm entry in a ZooKeeper-style
//! coordination store in sync:
//! - [`FarmJoiner`] syncs both ways. In private mode it owns the host's
//!   ephemeral record and the local resource wins; in common mode it shares
//!   one persistent record that wins once it exists.
//! - [`FarmImporter`] only publishes the local resource.
//!
//! # Architecture
//!
//! Both are the same [`FarmEntryWatcher`] engine parameterized by an
//! [`EntryRole`]. The engine subscribes to three sources and serializes them
//! onto one ordered queue:
//!
//! - **Local changes**: a [`ChangeNotifier`] on the resource's directory,
//!   filtered and coalesced by a [`DispatchHandle`]
//! - **Remote data**: a data watch on the entry's node
//! - **Connection**: session loss and re-establishment
//!
//! Echoes of the engine's own writes are recognized by transaction id and
//! never reach the local resource.
//!
//! # Example
//!
//! ```
//! use farmer_sync::local::mock::MemoryResource;
//! use farmer_sync::notifier::mock::RecordingNotifier;
//! use farmer_sync::store::memory::MemoryStore;
//! use farmer_sync::{EntryBindings, FarmImporter, WatcherConfig};
//! use farmer_types::FarmPath;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let bindings = EntryBindings::new(
//!     Arc::new(store.connect()),
//!     Arc::new(MemoryResource::new("/etc/app/conf.json")),
//!     Box::new(RecordingNotifier::new()),
//! );
//! let config = WatcherConfig {
//!     node_name: Some("10.0.0.7".to_string()),
//!     ..Default::default()
//! };
//!
//! let farm: FarmPath = "/services/db".parse().unwrap();
//! let importer = FarmImporter::import(farm, bindings, config).await.unwrap();
//! assert_eq!(importer.node_path(), "/services/db/10.0.0.7");
//! # });
//! ```

pub mod config;
mod error;
pub mod event;
mod importer;
mod joiner;
pub mod local;
pub mod notifier;
pub mod role;
pub mod state;
pub mod store;
mod watcher;

pub use config::{DEFAULT_HOSTNAME_FIELD, WatcherConfig};
pub use error::{FarmError, FarmResult, LocalError, LocalResult, StoreError, StoreResult};
pub use event::{DispatchHandle, FarmEvent, ShutdownHandle};
pub use importer::{FarmImporter, ImporterRole};
pub use joiner::{FarmJoiner, JoinerRole, UpdateCallback};
pub use local::{JsonFileResource, LocalResource};
pub use notifier::{ChangeNotifier, FsNotifier, LocalEvent};
pub use role::{EntryRole, LocalSide, PushPolicy, ReconnectPolicy};
pub use state::{LocalSnapshot, RemoteSnapshot};
pub use store::{
    ConnectionListener, ConnectionState, CoordinationClient, DataEvent, DataListener, NodeStat,
    SessionId,
};
pub use watcher::{EntryBindings, FarmEntryWatcher};
