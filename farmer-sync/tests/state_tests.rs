use farmer_sync::{DataEvent, LocalSnapshot, NodeStat, RemoteSnapshot, WatcherConfig};
use farmer_types::EntryPayload;
use serde_json::json;
use std::time::Duration;

fn payload(value: serde_json::Value) -> EntryPayload {
    EntryPayload::from_value(value).unwrap()
}

fn stat(created: u64, modified: u64) -> NodeStat {
    NodeStat {
        version: 0,
        created,
        modified,
        ephemeral_owner: Some(1),
    }
}

fn delivery(txid: u64) -> DataEvent {
    DataEvent {
        path: "/farm/node".to_string(),
        txid,
        data: None,
    }
}

// ── LocalSnapshot ────────────────────────────────────────────────

#[test]
fn local_snapshot_starts_invalid() {
    let snapshot = LocalSnapshot::default();
    assert!(!snapshot.is_valid());
    assert_eq!(snapshot.generation(), 0);
}

#[test]
fn reads_bump_generation_but_writes_do_not() {
    let mut snapshot = LocalSnapshot::default();
    snapshot.record_read(payload(json!({"a": 1})));
    snapshot.record_read(payload(json!({"a": 2})));
    snapshot.record_write(payload(json!({"a": 3})));

    assert_eq!(snapshot.generation(), 2);
    assert_eq!(snapshot.payload(), Some(&payload(json!({"a": 3}))));
}

// ── RemoteSnapshot ───────────────────────────────────────────────

#[test]
fn own_write_makes_its_echo_stale() {
    let mut remote = RemoteSnapshot::default();
    assert!(!remote.is_stale(&delivery(1)));

    remote.record_write(payload(json!({"a": 1})), stat(3, 5));
    assert!(remote.is_stale(&delivery(4)));
    assert!(remote.is_stale(&delivery(5)));
    assert!(!remote.is_stale(&delivery(6)));
    assert!(remote.matches(&payload(json!({"a": 1}))));
}

#[test]
fn observed_delivery_raises_watermark() {
    let mut remote = RemoteSnapshot::default();
    remote.record_observed(Some(payload(json!({"a": 1}))), stat(2, 7), 7);

    assert!(remote.exists());
    assert!(remote.is_stale(&delivery(7)));
    assert_eq!(remote.stat(), Some(stat(2, 7)));
}

#[test]
fn absent_record_never_matches() {
    let mut remote = RemoteSnapshot::default();
    remote.record_write(payload(json!({"a": 1})), stat(1, 1));
    remote.record_owned(stat(1, 1));
    assert_eq!(remote.owned(), Some(1));

    remote.record_absent(2);

    assert!(!remote.exists());
    assert!(!remote.matches(&payload(json!({"a": 1}))));
    assert_eq!(remote.owned(), None);
}

#[test]
fn session_loss_forgets_ownership_and_watch() {
    let mut remote = RemoteSnapshot::default();
    remote.record_write(payload(json!({"a": 1})), stat(4, 4));
    remote.record_owned(stat(4, 4));
    remote.record_session(Some(9));
    assert_eq!(remote.session(), Some(9));

    remote.session_lost();

    assert_eq!(remote.owned(), None);
    assert_eq!(remote.session(), None);
    assert!(remote.exists());
    assert!(remote.is_stale(&delivery(4)));
}

// ── WatcherConfig ────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = WatcherConfig::default();
    assert_eq!(config.node_name, None);
    assert_eq!(config.hostname_field, "hostname");
    assert_eq!(config.idle_timeout(), Duration::from_millis(100));
}

#[test]
fn config_overrides_host_identity() {
    let config: WatcherConfig =
        serde_json::from_str(r#"{"node_name": "10.0.0.7", "hostname": "db-1"}"#).unwrap();
    let host = config.host_identity();

    assert_eq!(host.address, "10.0.0.7");
    assert_eq!(host.hostname, "db-1");
    assert_eq!(config.idle_timeout_ms, 100);
}
