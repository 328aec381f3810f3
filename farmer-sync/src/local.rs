//! Local configuration resources.
//!
//! The engine reads and writes the local side of a farm entry through
//! [`LocalResource`]. [`JsonFileResource`] stores the payload as a JSON object
//! file; other formats plug in by implementing the trait.

use crate::error::{LocalError, LocalResult};
use async_trait::async_trait;
use farmer_types::EntryPayload;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// The local side of a farm entry.
#[async_trait]
pub trait LocalResource: Send + Sync {
    /// Path of the resource, used to filter change notifications.
    fn path(&self) -> &Path;

    /// Reads the resource. `Ok(None)` means it does not exist yet;
    /// `Err(LocalError::Malformed)` means it exists but cannot be parsed.
    async fn read(&self) -> LocalResult<Option<EntryPayload>>;

    /// Replaces the resource content.
    async fn write(&self, payload: &EntryPayload) -> LocalResult<()>;
}

/// A JSON object stored in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileResource {
    path: PathBuf,
}

impl JsonFileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn malformed(&self, reason: impl ToString) -> LocalError {
        LocalError::Malformed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LocalResource for JsonFileResource {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> LocalResult<Option<EntryPayload>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| self.malformed(e))?;
        EntryPayload::from_value(value)
            .map(Some)
            .map_err(|e| self.malformed(e))
    }

    async fn write(&self, payload: &EntryPayload) -> LocalResult<()> {
        let mut content = serde_json::to_string_pretty(payload.as_map())
            .map_err(|e| self.malformed(e))?;
        content.push('\n');

        // Write aside then rename, so readers never see a partial file.
        let staging = self.staging_path();
        fs::write(&staging, content).await?;
        fs::rename(&staging, &self.path).await?;
        debug!(path = %self.path.display(), "Wrote local resource");
        Ok(())
    }
}

/// A scriptable in-memory resource for tests.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    enum Content {
        Missing,
        Valid(EntryPayload),
        Malformed(String),
    }

    #[derive(Debug)]
    struct State {
        content: Content,
        reads: usize,
        writes: Vec<EntryPayload>,
    }

    /// Resource whose read result is set by the test and whose writes are
    /// recorded. Writes do not change what later reads return, like a mocked
    /// file accessor.
    #[derive(Debug, Clone)]
    pub struct MemoryResource {
        path: PathBuf,
        state: Arc<Mutex<State>>,
    }

    impl MemoryResource {
        /// A missing resource at `path`.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self {
                path: path.into(),
                state: Arc::new(Mutex::new(State {
                    content: Content::Missing,
                    reads: 0,
                    writes: Vec::new(),
                })),
            }
        }

        /// A resource at `path` holding `payload`.
        pub fn with_payload(path: impl Into<PathBuf>, payload: EntryPayload) -> Self {
            let resource = Self::new(path);
            resource.set_payload(payload);
            resource
        }

        /// Makes later reads return `payload`.
        pub fn set_payload(&self, payload: EntryPayload) {
            self.state.lock().content = Content::Valid(payload);
        }

        /// Makes later reads report a missing resource.
        pub fn set_missing(&self) {
            self.state.lock().content = Content::Missing;
        }

        /// Makes later reads fail as malformed.
        pub fn set_malformed(&self, reason: impl Into<String>) {
            self.state.lock().content = Content::Malformed(reason.into());
        }

        /// Payloads written so far, oldest first.
        pub fn writes(&self) -> Vec<EntryPayload> {
            self.state.lock().writes.clone()
        }

        /// The most recent write.
        pub fn last_write(&self) -> Option<EntryPayload> {
            self.state.lock().writes.last().cloned()
        }

        /// Forgets recorded writes and the read count.
        pub fn reset(&self) {
            let mut state = self.state.lock();
            state.writes.clear();
            state.reads = 0;
        }

        /// Number of reads so far.
        pub fn reads(&self) -> usize {
            self.state.lock().reads
        }
    }

    #[async_trait]
    impl LocalResource for MemoryResource {
        fn path(&self) -> &Path {
            &self.path
        }

        async fn read(&self) -> LocalResult<Option<EntryPayload>> {
            let mut state = self.state.lock();
            state.reads += 1;
            match &state.content {
                Content::Missing => Ok(None),
                Content::Valid(payload) => Ok(Some(payload.clone())),
                Content::Malformed(reason) => Err(LocalError::Malformed {
                    path: self.path.clone(),
                    reason: reason.clone(),
                }),
            }
        }

        async fn write(&self, payload: &EntryPayload) -> LocalResult<()> {
            self.state.lock().writes.push(payload.clone());
            Ok(())
        }
    }
}
