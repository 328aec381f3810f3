//! Farm entry watcher: the reconciliation loop shared by every role.
//!
//! One watcher owns one farm entry. It subscribes to three sources (local
//! change notifications, a data watch on the entry's node, and connection
//! state transitions), funnels them into a single ordered queue, and
//! processes that queue serially. No locking is needed inside a watcher.
//!
//! Reconciliation rules:
//! - A local read that fails is logged and dropped; nothing propagates.
//! - Remote writes are skipped when the payload matches the latest known
//!   remote content, and deferred while disconnected.
//! - Deliveries older than, or equal to, what this watcher already wrote or
//!   saw are echoes and never reach the role. The one exception is the
//!   initial delivery of a fresh data watch for a remote-authoritative role,
//!   which always reaches it so the current remote content is adopted.
//! - After a lost session, the role's reconnect policy decides whether the
//!   record is recreated from the latest local snapshot or adopted as is. A
//!   `Connected` notification under a session other than the one the watch
//!   was armed under counts as a reconnect even if no `Lost` was seen.
//!
//! Private records are local-authoritative on a best-effort basis only: a
//! remote write racing with our reconnect can still be observed by other
//! participants before the record is recreated.

use crate::config::WatcherConfig;
use crate::error::{FarmError, FarmResult, StoreError, StoreResult};
use crate::event::{DispatchHandle, FarmEvent, ShutdownHandle};
use crate::local::LocalResource;
use crate::notifier::{ChangeNotifier, LocalEvent};
use crate::role::{EntryRole, LocalSide, PushPolicy, ReconnectPolicy};
use crate::state::{LocalSnapshot, RemoteSnapshot};
use crate::store::{
    ConnectionListener, ConnectionState, CoordinationClient, DataEvent, DataListener, NodeStat,
};
use farmer_types::{EntryIdentity, EntryPayload, FarmPath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The external collaborators a watcher is bound to.
pub struct EntryBindings {
    pub client: Arc<dyn CoordinationClient>,
    pub resource: Arc<dyn LocalResource>,
    pub notifier: Box<dyn ChangeNotifier>,
}

impl EntryBindings {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        resource: Arc<dyn LocalResource>,
        notifier: Box<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            client,
            resource,
            notifier,
        }
    }
}

/// Keeps one farm entry in sync with a local resource.
pub struct FarmEntryWatcher<R: EntryRole> {
    role: R,
    farm: FarmPath,
    node_path: String,
    config: WatcherConfig,
    client: Arc<dyn CoordinationClient>,
    resource: Arc<dyn LocalResource>,
    /// Kept alive for as long as the watcher runs.
    _notifier: Box<dyn ChangeNotifier>,
    local: LocalSnapshot,
    remote: RemoteSnapshot,
    connection: ConnectionState,
    /// The next delivery bypasses the staleness check.
    resync: bool,
    pending: Arc<AtomicBool>,
    dispatch: DispatchHandle,
    events_tx: mpsc::UnboundedSender<FarmEvent>,
    events_rx: mpsc::UnboundedReceiver<FarmEvent>,
}

impl<R: EntryRole> FarmEntryWatcher<R> {
    /// Starts a watcher for `role`'s entry in `farm`.
    ///
    /// Reads the local resource, subscribes to local changes in its
    /// directory, establishes the remote record and its data watch, then
    /// subscribes to connection transitions. Events produced during startup
    /// are queued; drive the loop with [`run`](Self::run) or
    /// [`run_for`](Self::run_for).
    pub async fn start(
        role: R,
        farm: FarmPath,
        bindings: EntryBindings,
        config: WatcherConfig,
    ) -> FarmResult<Self> {
        let EntryBindings {
            client,
            resource,
            mut notifier,
        } = bindings;

        let node_path = role.identity().node_path(&farm)?;
        let observed = observed_path(resource.path());
        let pending = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatch = DispatchHandle::new(observed.clone(), Arc::clone(&pending), events_tx.clone());
        let connection = if client.session_id().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Lost
        };

        info!(
            farm = %farm,
            node = %node_path,
            resource = %observed.display(),
            "Starting farm entry watcher"
        );

        let watch_dir = observed
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        notifier.watch(&watch_dir, true, dispatch.clone())?;

        let mut watcher = Self {
            role,
            farm,
            node_path,
            config,
            client,
            resource,
            _notifier: notifier,
            local: LocalSnapshot::default(),
            remote: RemoteSnapshot::default(),
            connection,
            resync: false,
            pending,
            dispatch,
            events_tx,
            events_rx,
        };

        watcher.read_local().await?;
        watcher.establish_remote().await?;
        if watcher.connection == ConnectionState::Connected {
            watcher.subscribe_data().await?;
        }
        watcher.subscribe_connection();

        Ok(watcher)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn identity(&self) -> &EntryIdentity {
        self.role.identity()
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    pub fn farm(&self) -> &FarmPath {
        &self.farm
    }

    /// Full path of the entry's node.
    pub fn node_path(&self) -> &str {
        &self.node_path
    }

    /// Absolute path of the observed local resource.
    pub fn observed_path(&self) -> &Path {
        self.dispatch.observed_path()
    }

    pub fn local_snapshot(&self) -> &LocalSnapshot {
        &self.local
    }

    pub fn remote_snapshot(&self) -> &RemoteSnapshot {
        &self.remote
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Whether a local change is waiting to be reconciled.
    pub fn has_pending_change(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Handle for routing local change notifications from other threads.
    pub fn dispatch_handle(&self) -> DispatchHandle {
        self.dispatch.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.events_tx.clone())
    }

    /// Routes a local change notification. See [`DispatchHandle::dispatch`].
    pub fn dispatch(&self, event: &LocalEvent) -> bool {
        self.dispatch.dispatch(event)
    }

    // ── Loop ─────────────────────────────────────────────────────

    /// Processes queued events until a shutdown is requested.
    pub async fn run(mut self) -> FarmResult<()> {
        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, FarmEvent::Shutdown) {
                info!(node = %self.node_path, "Farm entry watcher stopped");
                return Ok(());
            }
            self.handle(event).await?;
        }
        Err(FarmError::ChannelClosed)
    }

    /// Processes at most `max_events` events, waiting up to `idle` for each.
    /// Returns early once the queue stays empty for `idle`.
    ///
    /// Returns the number of events processed.
    pub async fn run_for(&mut self, max_events: usize, idle: Duration) -> FarmResult<usize> {
        let mut processed = 0;
        while processed < max_events {
            match tokio::time::timeout(idle, self.events_rx.recv()).await {
                Ok(Some(FarmEvent::Shutdown)) | Err(_) => break,
                Ok(Some(event)) => {
                    self.handle(event).await?;
                    processed += 1;
                }
                Ok(None) => return Err(FarmError::ChannelClosed),
            }
        }
        Ok(processed)
    }

    /// Processes events until the queue stays empty for the configured idle
    /// timeout.
    pub async fn run_until_idle(&mut self) -> FarmResult<usize> {
        let idle = self.config.idle_timeout();
        self.run_for(usize::MAX, idle).await
    }

    async fn handle(&mut self, event: FarmEvent) -> FarmResult<()> {
        match event {
            FarmEvent::LocalChange => self.on_local_change().await,
            FarmEvent::RemoteData(event) => self.on_remote_data(event).await,
            FarmEvent::Connection(state) => self.on_connection(state).await,
            FarmEvent::Shutdown => Ok(()),
        }
    }

    // ── Local → remote ───────────────────────────────────────────

    async fn on_local_change(&mut self) -> FarmResult<()> {
        if !self.pending.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        match self.read_local().await? {
            Some(payload) => self.push_local(payload).await,
            None => Ok(()),
        }
    }

    /// Reads and normalizes the local resource, writing the normalized form
    /// back when it differs. Returns `None` if the read failed.
    async fn read_local(&mut self) -> FarmResult<Option<EntryPayload>> {
        let raw = match self.resource.read().await {
            Ok(raw) => raw.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable local resource");
                return Ok(None);
            }
        };

        let payload = self.role.normalize(raw.clone());
        if self.role.writes_local() && payload != raw {
            self.resource
                .write(&payload)
                .await
                .map_err(FarmError::LocalWrite)?;
            debug!(payload = %payload, "Wrote normalized payload back to local resource");
        }

        self.local.record_read(payload.clone());
        debug!(generation = self.local.generation(), payload = %payload, "Read local resource");
        Ok(Some(payload))
    }

    async fn push_local(&mut self, payload: EntryPayload) -> FarmResult<()> {
        if self.connection == ConnectionState::Lost {
            debug!("Disconnected, local change deferred until reconnect");
            return Ok(());
        }
        match self.role.push_policy() {
            PushPolicy::Always => {
                if self.remote.matches(&payload) {
                    debug!("Remote record already up to date");
                    return Ok(());
                }
                self.publish(payload).await
            }
            PushPolicy::CreateOnly => {
                if self.remote.exists() {
                    debug!("Remote record is authoritative, local change not pushed");
                    return Ok(());
                }
                self.create_shared(payload).await
            }
        }
    }

    /// Writes `payload` to the ephemeral record, creating it if this session
    /// does not own the current incarnation.
    async fn publish(&mut self, payload: EntryPayload) -> FarmResult<()> {
        let data = payload.to_bytes();
        let result = match self.remote.owned() {
            Some(created) => match self.client.set(&self.node_path, &data).await {
                Ok(stat) if stat.created == created => Ok(stat),
                Ok(_) | Err(StoreError::NoNode(_)) => self.establish_ephemeral(&data).await,
                Err(e) => Err(e),
            },
            None => self.establish_ephemeral(&data).await,
        };

        match result {
            Ok(stat) => {
                info!(node = %self.node_path, version = stat.version, payload = %payload, "Published local payload");
                self.remote.record_write(payload, stat);
                Ok(())
            }
            Err(e) => self.remote_failure(e),
        }
    }

    /// Replaces whatever sits at the node path with an ephemeral node owned by
    /// this session.
    async fn establish_ephemeral(&mut self, data: &[u8]) -> StoreResult<NodeStat> {
        let stat = match self.client.create(&self.node_path, data, true).await {
            Err(StoreError::NodeExists(_)) => {
                debug!(node = %self.node_path, "Replacing existing node with an ephemeral one");
                match self.client.delete(&self.node_path).await {
                    Ok(()) | Err(StoreError::NoNode(_)) => {}
                    Err(e) => return Err(e),
                }
                self.client.create(&self.node_path, data, true).await?
            }
            other => other?,
        };
        self.remote.record_owned(stat);
        Ok(stat)
    }

    /// Creates the persistent shared record if it is missing.
    async fn create_shared(&mut self, payload: EntryPayload) -> FarmResult<()> {
        match self.client.create(&self.node_path, &payload.to_bytes(), false).await {
            Ok(stat) => {
                info!(node = %self.node_path, payload = %payload, "Created shared record");
                self.remote.record_write(payload, stat);
                Ok(())
            }
            Err(StoreError::NodeExists(_)) => {
                debug!(node = %self.node_path, "Shared record exists, adopting remote content");
                Ok(())
            }
            Err(e) => self.remote_failure(e),
        }
    }

    /// Ensures the farm path exists and the entry's record is in place per
    /// the role's reconnect policy.
    async fn establish_remote(&mut self) -> FarmResult<()> {
        if let Err(e) = self.client.ensure_path(self.farm.as_str()).await {
            return self.remote_failure(e);
        }
        let Some(payload) = self.local.payload().cloned() else {
            debug!("No valid local payload yet, remote record left as is");
            return Ok(());
        };
        match self.role.reconnect_policy() {
            ReconnectPolicy::Recreate => {
                self.remote.session_lost();
                self.publish(payload).await
            }
            ReconnectPolicy::EnsureExists => self.create_shared(payload).await,
        }
    }

    /// Swallows disconnection failures, surfaces everything else.
    fn remote_failure(&mut self, e: StoreError) -> FarmResult<()> {
        if e.is_disconnect() {
            debug!(error = %e, "Store unavailable, retrying on reconnect");
            self.connection = ConnectionState::Lost;
            self.remote.session_lost();
            Ok(())
        } else {
            error!(node = %self.node_path, error = %e, "Coordination store operation failed");
            Err(e.into())
        }
    }

    // ── Remote → local ───────────────────────────────────────────

    async fn subscribe_data(&mut self) -> FarmResult<()> {
        let session = self.client.session_id();
        let tx = self.events_tx.clone();
        let listener: DataListener = Arc::new(move |event: DataEvent| {
            let _ = tx.send(FarmEvent::RemoteData(event));
        });
        match self.client.watch_data(&self.node_path, listener).await {
            Ok(()) => {
                debug!(node = %self.node_path, ?session, "Watching remote record");
                self.remote.record_session(session);
                // Watches fire right away with the current state; that first
                // delivery is the adoption point for remote-authoritative roles.
                self.resync = self.role.reconnect_policy() == ReconnectPolicy::EnsureExists;
                Ok(())
            }
            Err(e) => self.remote_failure(e),
        }
    }

    async fn on_remote_data(&mut self, event: DataEvent) -> FarmResult<()> {
        if event.path != self.node_path {
            return Ok(());
        }
        let resync = std::mem::take(&mut self.resync);
        if self.remote.is_stale(&event) && !resync {
            return Ok(());
        }

        let Some((data, stat)) = event.data else {
            info!(node = %self.node_path, "Remote record was deleted");
            self.remote.record_absent(event.txid);
            return Ok(());
        };

        let delivered = match EntryPayload::from_bytes(&data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(node = %self.node_path, error = %e, "Ignoring undecodable remote payload");
                self.remote.record_observed(None, stat, event.txid);
                return Ok(());
            }
        };
        debug!(version = stat.version, payload = %delivered, "Remote record changed");
        self.remote
            .record_observed(Some(delivered.clone()), stat, event.txid);

        if self.role.writes_local() {
            self.refresh_local().await;
        }
        self.role
            .apply_remote(
                delivered,
                LocalSide {
                    resource: self.resource.as_ref(),
                    snapshot: &mut self.local,
                },
            )
            .await?;
        Ok(())
    }

    /// Re-reads the local resource so remote content is compared with what is
    /// on disk now. A failed read keeps the previous snapshot.
    async fn refresh_local(&mut self) {
        match self.resource.read().await {
            Ok(raw) => {
                let payload = self.role.normalize(raw.unwrap_or_default());
                self.local.record_read(payload);
            }
            Err(e) => debug!(error = %e, "Keeping previous local snapshot"),
        }
    }

    // ── Connection ───────────────────────────────────────────────

    fn subscribe_connection(&mut self) {
        let tx = self.events_tx.clone();
        let listener: ConnectionListener = Arc::new(move |state| {
            let _ = tx.send(FarmEvent::Connection(state));
        });
        self.client.add_connection_listener(listener);

        // A reconnect or expiry that happened before the listener was registered.
        let session = self.client.session_id();
        if session.is_some() && session != self.remote.session() {
            let _ = self
                .events_tx
                .send(FarmEvent::Connection(ConnectionState::Connected));
        }
    }

    async fn on_connection(&mut self, state: ConnectionState) -> FarmResult<()> {
        match state {
            ConnectionState::Lost => {
                if self.connection == ConnectionState::Connected {
                    warn!(node = %self.node_path, "Lost coordination store session");
                }
                self.connection = ConnectionState::Lost;
                self.remote.session_lost();
                Ok(())
            }
            ConnectionState::Connected => {
                let session = self.client.session_id();
                if session.is_none() {
                    return Ok(());
                }
                if self.connection == ConnectionState::Connected {
                    if session == self.remote.session() {
                        return Ok(());
                    }
                    warn!(node = %self.node_path, ?session, "Session replaced without a loss notification");
                    self.remote.session_lost();
                }
                info!(node = %self.node_path, ?session, "Reconnected to coordination store");
                self.connection = ConnectionState::Connected;
                self.establish_remote().await?;
                if self.connection == ConnectionState::Connected {
                    self.subscribe_data().await?;
                }
                Ok(())
            }
        }
    }
}

/// Absolute form of the resource path, with the directory part canonicalized
/// when it exists so it compares equal to paths reported by the platform.
fn observed_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let canonical = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent.canonicalize().ok().map(|dir| dir.join(name)),
        _ => None,
    };
    canonical.unwrap_or(absolute)
}
