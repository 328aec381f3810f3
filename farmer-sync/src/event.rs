//! The ordered event queue feeding a watcher's reconciliation loop.
//!
//! Local-change notifications, data watch deliveries and connection
//! transitions all arrive on different threads; each is turned into a
//! [`FarmEvent`] and pushed onto one unbounded queue that the watcher drains
//! serially.

use crate::notifier::LocalEvent;
use crate::store::{ConnectionState, DataEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

/// An input of the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarmEvent {
    /// The local resource may have changed (see the pending flag).
    LocalChange,
    /// A data watch fired.
    RemoteData(DataEvent),
    /// The store connection changed state.
    Connection(ConnectionState),
    /// Stop the loop.
    Shutdown,
}

/// Routes local-change notifications into a watcher.
///
/// Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    observed: Arc<PathBuf>,
    pending: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<FarmEvent>,
}

impl DispatchHandle {
    pub(crate) fn new(
        observed: PathBuf,
        pending: Arc<AtomicBool>,
        tx: mpsc::UnboundedSender<FarmEvent>,
    ) -> Self {
        Self {
            observed: Arc::new(observed),
            pending,
            tx,
        }
    }

    /// The local resource path this handle accepts events for.
    pub fn observed_path(&self) -> &Path {
        &self.observed
    }

    /// Accepts `event` if it concerns the observed resource and raises the
    /// pending-change flag. Move events are matched on their destination.
    ///
    /// Returns whether the event was accepted.
    pub fn dispatch(&self, event: &LocalEvent) -> bool {
        if event.reported_path() != self.observed.as_path() {
            trace!(path = %event.reported_path().display(), "Ignoring unrelated local event");
            return false;
        }
        // Only the first notification of a burst needs a queue slot.
        if !self.pending.swap(true, Ordering::SeqCst) && self.tx.send(FarmEvent::LocalChange).is_err()
        {
            trace!("Watcher is gone, dropping local event");
        }
        true
    }
}

/// Stops a watcher running [`run`](crate::FarmEntryWatcher::run).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<FarmEvent>,
}

impl ShutdownHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<FarmEvent>) -> Self {
        Self { tx }
    }

    /// Asks the loop to stop after the events already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(FarmEvent::Shutdown);
    }
}
