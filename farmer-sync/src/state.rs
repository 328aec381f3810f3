//! Per-entry sync state.
//!
//! A watcher keeps one snapshot of each side of the entry. Snapshots are
//! mutated in place by the reconciliation loop only.

use crate::store::{DataEvent, NodeStat, SessionId};
use farmer_types::EntryPayload;
use serde::Serialize;

/// Last successfully read local payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalSnapshot {
    payload: Option<EntryPayload>,
    generation: u64,
}

impl LocalSnapshot {
    /// The payload, or `None` if no read has succeeded yet.
    pub fn payload(&self) -> Option<&EntryPayload> {
        self.payload.as_ref()
    }

    /// Number of successful reads so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.payload.is_some()
    }

    /// Records a successful read.
    pub fn record_read(&mut self, payload: EntryPayload) {
        self.payload = Some(payload);
        self.generation += 1;
    }

    /// Records content this engine wrote to the resource.
    pub fn record_write(&mut self, payload: EntryPayload) {
        self.payload = Some(payload);
    }
}

/// What the engine knows about the remote record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteSnapshot {
    /// Latest known content: our own last write or the last non-stale
    /// delivery, whichever is newer.
    payload: Option<EntryPayload>,
    stat: Option<NodeStat>,
    /// Whether the record is known to exist.
    exists: bool,
    /// Newest transaction accounted for.
    watermark: u64,
    /// Creation transaction of the record incarnation this session wrote.
    owned: Option<u64>,
    /// Session the record and its data watch were set up under.
    session: Option<SessionId>,
}

impl RemoteSnapshot {
    pub fn payload(&self) -> Option<&EntryPayload> {
        self.payload.as_ref()
    }

    pub fn stat(&self) -> Option<NodeStat> {
        self.stat
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Creation transaction of the incarnation created by this session.
    pub fn owned(&self) -> Option<u64> {
        self.owned
    }

    /// Session the record and its data watch were set up under.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    /// Whether pushing `payload` would be a no-op.
    pub fn matches(&self, payload: &EntryPayload) -> bool {
        self.exists && self.payload.as_ref() == Some(payload)
    }

    /// Whether `event` reports a state no newer than one already accounted
    /// for. Echoes of our own writes fall in this category.
    pub fn is_stale(&self, event: &DataEvent) -> bool {
        event.txid <= self.watermark
    }

    /// Records a successful write by this engine.
    pub fn record_write(&mut self, payload: EntryPayload, stat: NodeStat) {
        self.payload = Some(payload);
        self.stat = Some(stat);
        self.exists = true;
        self.watermark = self.watermark.max(stat.modified);
    }

    /// Records that this session created the current incarnation.
    pub fn record_owned(&mut self, stat: NodeStat) {
        self.owned = Some(stat.created);
    }

    /// Records a delivery that carries content.
    pub fn record_observed(&mut self, payload: Option<EntryPayload>, stat: NodeStat, txid: u64) {
        self.payload = payload;
        self.stat = Some(stat);
        self.exists = true;
        self.watermark = self.watermark.max(txid);
    }

    /// Records a delivery reporting the record as deleted.
    pub fn record_absent(&mut self, txid: u64) {
        self.payload = None;
        self.stat = None;
        self.exists = false;
        self.owned = None;
        self.watermark = self.watermark.max(txid);
    }

    /// Records that the data watch is armed under `session`.
    pub fn record_session(&mut self, session: Option<SessionId>) {
        self.session = session;
    }

    /// Forgets ownership and the watch; the session that set them up is gone.
    pub fn session_lost(&mut self) {
        self.owned = None;
        self.session = None;
    }
}
