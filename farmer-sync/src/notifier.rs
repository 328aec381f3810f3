//! Local change notifications.
//!
//! A [`ChangeNotifier`] watches the directory containing the local resource
//! and hands every event to a [`DispatchHandle`], which filters on the
//! resource path. [`FsNotifier`] uses the platform watcher from `notify`.

use crate::error::{FarmError, FarmResult};
use crate::event::DispatchHandle;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A filesystem change reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEvent {
    /// Path the event happened on.
    pub src_path: PathBuf,
    /// Destination, for move events.
    pub dest_path: Option<PathBuf>,
}

impl LocalEvent {
    /// A create, modify or delete event on `path`.
    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self {
            src_path: path.into(),
            dest_path: None,
        }
    }

    /// A move from `from` to `to`.
    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            src_path: from.into(),
            dest_path: Some(to.into()),
        }
    }

    /// The path a watcher compares against: the destination of a move, the
    /// source otherwise.
    pub fn reported_path(&self) -> &Path {
        self.dest_path.as_deref().unwrap_or(&self.src_path)
    }

    /// Normalizes a raw `notify` event.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        match event.kind {
            EventKind::Access(_) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
                let mut paths = event.paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => vec![Self::moved(from, to)],
                    _ => Vec::new(),
                }
            }
            _ => event.paths.into_iter().map(Self::changed).collect(),
        }
    }
}

/// Source of local change notifications.
pub trait ChangeNotifier: Send {
    /// Starts watching `dir`, routing every event through `handle`.
    fn watch(&mut self, dir: &Path, recursive: bool, handle: DispatchHandle) -> FarmResult<()>;
}

/// Notifier backed by the platform filesystem watcher.
#[derive(Default)]
pub struct FsNotifier {
    watcher: Option<RecommendedWatcher>,
}

impl FsNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeNotifier for FsNotifier {
    fn watch(&mut self, dir: &Path, recursive: bool, handle: DispatchHandle) -> FarmResult<()> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for local in LocalEvent::from_notify(event) {
                        handle.dispatch(&local);
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            }
        })
        .map_err(|e| FarmError::Notifier(e.to_string()))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(dir, mode)
            .map_err(|e| FarmError::Notifier(format!("cannot watch {}: {e}", dir.display())))?;
        debug!(dir = %dir.display(), recursive, "Watching for local changes");

        self.watcher = Some(watcher);
        Ok(())
    }
}

/// A notifier for tests: records subscriptions and lets the test emit events.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        subscriptions: Vec<(PathBuf, bool)>,
        handle: Option<DispatchHandle>,
    }

    /// Records `watch` calls instead of touching the filesystem.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        recorded: Arc<Mutex<Recorded>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every `(dir, recursive)` pair passed to `watch`.
        pub fn subscriptions(&self) -> Vec<(PathBuf, bool)> {
            self.recorded.lock().subscriptions.clone()
        }

        /// Delivers an event as the real notifier would.
        ///
        /// Returns whether the watcher accepted it; `false` if nothing
        /// subscribed yet.
        pub fn emit(&self, event: LocalEvent) -> bool {
            let handle = self.recorded.lock().handle.clone();
            handle.is_some_and(|h| h.dispatch(&event))
        }
    }

    impl ChangeNotifier for RecordingNotifier {
        fn watch(&mut self, dir: &Path, recursive: bool, handle: DispatchHandle) -> FarmResult<()> {
            let mut recorded = self.recorded.lock();
            recorded.subscriptions.push((dir.to_path_buf(), recursive));
            recorded.handle = Some(handle);
            Ok(())
        }
    }
}
