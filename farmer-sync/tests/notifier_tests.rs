use farmer_sync::notifier::mock::RecordingNotifier;
use farmer_sync::store::memory::MemoryStore;
use farmer_sync::{EntryBindings, FarmJoiner, FsNotifier, JsonFileResource, LocalEvent, WatcherConfig};
use farmer_types::{EntryPayload, FarmPath};
use notify::event::{AccessKind, CreateKind, EventKind, ModifyKind, RenameMode};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── LocalEvent ───────────────────────────────────────────────────

#[test]
fn reported_path_prefers_destination() {
    let changed = LocalEvent::changed("/a/conf.json");
    assert_eq!(changed.reported_path(), Path::new("/a/conf.json"));

    let moved = LocalEvent::moved("/a/.conf.json.swp", "/a/conf.json");
    assert_eq!(moved.reported_path(), Path::new("/a/conf.json"));
}

#[test]
fn rename_with_both_paths_becomes_move() {
    let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        .add_path(PathBuf::from("/a/tmp"))
        .add_path(PathBuf::from("/a/conf.json"));

    assert_eq!(
        LocalEvent::from_notify(event),
        vec![LocalEvent::moved("/a/tmp", "/a/conf.json")]
    );
}

#[test]
fn other_events_map_one_per_path() {
    let event = notify::Event::new(EventKind::Create(CreateKind::File))
        .add_path(PathBuf::from("/a/one"))
        .add_path(PathBuf::from("/a/two"));

    assert_eq!(
        LocalEvent::from_notify(event),
        vec![LocalEvent::changed("/a/one"), LocalEvent::changed("/a/two")]
    );
}

#[test]
fn access_events_are_dropped() {
    let event = notify::Event::new(EventKind::Access(AccessKind::Any))
        .add_path(PathBuf::from("/a/conf.json"));
    assert!(LocalEvent::from_notify(event).is_empty());
}

// ── RecordingNotifier ────────────────────────────────────────────

#[test]
fn recording_notifier_without_subscription_drops_events() {
    let notifier = RecordingNotifier::new();
    assert!(!notifier.emit(LocalEvent::changed("/a/conf.json")));
    assert!(notifier.subscriptions().is_empty());
}

// ── FsNotifier ───────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn file_edits_reach_the_store() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let conf = dir.path().join("conf.json");
    std::fs::write(&conf, r#"{"enabled": "1"}"#).unwrap();

    let store = MemoryStore::new();
    let bindings = EntryBindings::new(
        Arc::new(store.connect()),
        Arc::new(JsonFileResource::new(&conf)),
        Box::new(FsNotifier::new()),
    );
    let config = WatcherConfig {
        node_name: Some("1.1.1.1".to_string()),
        hostname: Some("zk-test".to_string()),
        ..Default::default()
    };
    let mut joiner = FarmJoiner::join(FarmPath::new("/farm").unwrap(), bindings, false, None, config)
        .await
        .unwrap();

    // The injected hostname was written back to the file.
    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&conf).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"enabled": "1", "hostname": "zk-test"}));

    std::fs::write(&conf, r#"{"enabled": "0", "hostname": "zk-test"}"#).unwrap();

    let expected = EntryPayload::from_value(json!({"enabled": "0", "hostname": "zk-test"})).unwrap();
    for _ in 0..50 {
        joiner
            .run_for(usize::MAX, Duration::from_millis(100))
            .await
            .unwrap();
        if store.payload("/farm/1.1.1.1") == Some(expected.clone()) {
            return;
        }
    }
    panic!("local edit never reached the store");
}
