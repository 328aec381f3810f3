//! In-process coordination store.
//!
//! Implements the ZooKeeper-style contract of [`CoordinationClient`] on top of
//! a shared in-memory tree: sessions own ephemeral nodes, every mutation gets
//! a store-wide transaction id, and data watches are bound to the session that
//! registered them. [`MemorySession`] exposes the session controls tests need
//! (`disconnect`, `reconnect`, `expire`), and [`MemoryStore::deny_writes`]
//! simulates an access-control failure.

use super::{
    ConnectionListener, ConnectionState, CoordinationClient, DataEvent, DataListener, NodeStat,
    SessionId,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use farmer_types::EntryPayload;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Watch deliveries collected under the store lock, fired after release.
type Deliveries = Vec<(DataListener, DataEvent)>;

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    stat: NodeStat,
}

#[derive(Default)]
struct StoreInner {
    nodes: BTreeMap<String, Node>,
    txid: u64,
    next_session: SessionId,
    /// Live sessions and their data watches.
    sessions: HashMap<SessionId, Vec<(String, DataListener)>>,
    denied: HashSet<String>,
}

impl StoreInner {
    fn open_session(&mut self) -> SessionId {
        self.next_session += 1;
        let id = self.next_session;
        self.sessions.insert(id, Vec::new());
        id
    }

    fn check_session(&self, session: Option<SessionId>) -> StoreResult<SessionId> {
        match session {
            None => Err(StoreError::ConnectionLoss),
            Some(id) if self.sessions.contains_key(&id) => Ok(id),
            Some(_) => Err(StoreError::SessionExpired),
        }
    }

    fn check_writable(&self, path: &str) -> StoreResult<()> {
        if self.denied.contains(path) {
            return Err(StoreError::NoAuth(path.to_string()));
        }
        Ok(())
    }

    fn next_txid(&mut self) -> u64 {
        self.txid += 1;
        self.txid
    }

    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{path}/");
        self.nodes
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    fn event(&self, path: &str, txid: u64) -> DataEvent {
        DataEvent {
            path: path.to_string(),
            txid,
            data: self
                .nodes
                .get(path)
                .map(|node| (node.data.clone(), node.stat)),
        }
    }

    fn deliveries(&self, path: &str, txid: u64) -> Deliveries {
        let event = self.event(path, txid);
        self.sessions
            .values()
            .flatten()
            .filter(|(watched, _)| watched == path)
            .map(|(_, listener)| (Arc::clone(listener), event.clone()))
            .collect()
    }

    fn create(
        &mut self,
        session: SessionId,
        path: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> StoreResult<(NodeStat, Deliveries)> {
        validate(path)?;
        if path == "/" || self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }
        let parent = parent(path);
        if !self.exists(parent) {
            return Err(StoreError::NoNode(parent.to_string()));
        }
        self.check_writable(path)?;

        let txid = self.next_txid();
        let stat = NodeStat {
            version: 0,
            created: txid,
            modified: txid,
            ephemeral_owner: ephemeral.then_some(session),
        };
        self.nodes.insert(
            path.to_string(),
            Node {
                data: data.to_vec(),
                stat,
            },
        );
        Ok((stat, self.deliveries(path, txid)))
    }

    fn set(&mut self, path: &str, data: &[u8]) -> StoreResult<(NodeStat, Deliveries)> {
        validate(path)?;
        self.check_writable(path)?;
        if !self.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        let txid = self.next_txid();
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.modified = txid;
        let stat = node.stat;
        Ok((stat, self.deliveries(path, txid)))
    }

    fn delete(&mut self, path: &str) -> StoreResult<Deliveries> {
        validate(path)?;
        self.check_writable(path)?;
        if !self.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        if self.has_children(path) {
            return Err(StoreError::NotEmpty(path.to_string()));
        }
        let txid = self.next_txid();
        self.nodes.remove(path);
        Ok(self.deliveries(path, txid))
    }

    /// Drops a session's watches and destroys its ephemeral nodes.
    fn end_session(&mut self, session: SessionId) -> Deliveries {
        self.sessions.remove(&session);
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();

        let mut deliveries = Vec::new();
        for path in owned {
            let txid = self.next_txid();
            self.nodes.remove(&path);
            debug!(session, %path, "Removed ephemeral node of ended session");
            deliveries.extend(self.deliveries(&path, txid));
        }
        deliveries
    }
}

fn validate(path: &str) -> StoreResult<()> {
    if path == "/" {
        return Ok(());
    }
    let valid = path.starts_with('/')
        && !path.ends_with('/')
        && path[1..].split('/').all(|segment| !segment.is_empty());
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn fire(deliveries: Deliveries) {
    for (listener, event) in deliveries {
        listener(event);
    }
}

/// Shared in-memory node tree. Cloning yields another handle to the same tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connected client session.
    pub fn connect(&self) -> MemorySession {
        let id = self.inner.lock().open_session();
        trace!(session = id, "Opened session");
        MemorySession {
            store: self.clone(),
            state: Arc::new(Mutex::new(SessionState {
                session: Some(id),
                listeners: Vec::new(),
            })),
        }
    }

    /// Makes every later write to `path` fail with `NoAuth`.
    pub fn deny_writes(&self, path: impl Into<String>) {
        self.inner.lock().denied.insert(path.into());
    }

    /// Reads a node without a session.
    pub fn node(&self, path: &str) -> Option<(Vec<u8>, NodeStat)> {
        self.inner
            .lock()
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
    }

    /// Decodes the payload stored at `path`, if any.
    pub fn payload(&self, path: &str) -> Option<EntryPayload> {
        self.node(path)
            .and_then(|(data, _)| EntryPayload::from_bytes(&data).ok())
    }

    /// Names of the direct children of `path`.
    pub fn children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.inner
            .lock()
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    /// Last transaction id handed out.
    pub fn txid(&self) -> u64 {
        self.inner.lock().txid
    }
}

struct SessionState {
    session: Option<SessionId>,
    listeners: Vec<ConnectionListener>,
}

/// A client connection to a [`MemoryStore`].
///
/// Clones share the same connection, so a test can keep a handle to drive
/// disconnects while the engine owns another.
#[derive(Clone)]
pub struct MemorySession {
    store: MemoryStore,
    state: Arc<Mutex<SessionState>>,
}

impl MemorySession {
    /// Whether the client currently holds a live session.
    pub fn is_connected(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Drops the connection. The session ends at once: its ephemeral nodes
    /// are destroyed, its watches are dropped and listeners see `Lost`.
    pub fn disconnect(&self) {
        let (session, listeners) = {
            let mut state = self.state.lock();
            (state.session.take(), state.listeners.clone())
        };
        let Some(session) = session else {
            return;
        };

        let deliveries = self.store.inner.lock().end_session(session);
        fire(deliveries);
        debug!(session, "Session lost");
        for listener in listeners {
            listener(ConnectionState::Lost);
        }
    }

    /// Establishes a fresh session and notifies listeners with `Connected`.
    pub fn reconnect(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.session.is_some() {
                return;
            }
            let id = self.store.inner.lock().open_session();
            state.session = Some(id);
            debug!(session = id, "Session established");
            state.listeners.clone()
        };
        for listener in listeners {
            listener(ConnectionState::Connected);
        }
    }

    /// Expires the session and immediately reconnects with a new one.
    pub fn expire(&self) {
        self.disconnect();
        self.reconnect();
    }

    fn session(&self) -> Option<SessionId> {
        self.state.lock().session
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> Option<SessionId> {
        self.session()
    }

    async fn ensure_path(&self, path: &str) -> StoreResult<()> {
        validate(path)?;
        let session = self.session();
        let mut deliveries = Vec::new();
        {
            let mut inner = self.store.inner.lock();
            let session = inner.check_session(session)?;
            let mut current = String::new();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                current.push('/');
                current.push_str(segment);
                if !inner.exists(&current) {
                    let (_, fired) = inner.create(session, &current, &[], false)?;
                    deliveries.extend(fired);
                }
            }
        }
        fire(deliveries);
        Ok(())
    }

    async fn create(&self, path: &str, data: &[u8], ephemeral: bool) -> StoreResult<NodeStat> {
        let session = self.session();
        let (stat, deliveries) = {
            let mut inner = self.store.inner.lock();
            let session = inner.check_session(session)?;
            inner.create(session, path, data, ephemeral)?
        };
        fire(deliveries);
        Ok(stat)
    }

    async fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat> {
        let session = self.session();
        let (stat, deliveries) = {
            let mut inner = self.store.inner.lock();
            inner.check_session(session)?;
            inner.set(path, data)?
        };
        fire(deliveries);
        Ok(stat)
    }

    async fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)> {
        let session = self.session();
        let inner = self.store.inner.lock();
        inner.check_session(session)?;
        inner
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>> {
        let session = self.session();
        let inner = self.store.inner.lock();
        inner.check_session(session)?;
        Ok(inner.nodes.get(path).map(|node| node.stat))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let session = self.session();
        let deliveries = {
            let mut inner = self.store.inner.lock();
            inner.check_session(session)?;
            inner.delete(path)?
        };
        fire(deliveries);
        Ok(())
    }

    async fn watch_data(&self, path: &str, listener: DataListener) -> StoreResult<()> {
        validate(path)?;
        let session = self.session();
        let initial = {
            let mut inner = self.store.inner.lock();
            let session = inner.check_session(session)?;
            let txid = inner
                .nodes
                .get(path)
                .map_or(inner.txid, |node| node.stat.modified);
            let event = inner.event(path, txid);
            inner
                .sessions
                .entry(session)
                .or_default()
                .push((path.to_string(), Arc::clone(&listener)));
            event
        };
        listener(initial);
        Ok(())
    }

    fn add_connection_listener(&self, listener: ConnectionListener) {
        self.state.lock().listeners.push(listener);
    }
}
