use farmer_sync::local::mock::MemoryResource;
use farmer_sync::notifier::mock::RecordingNotifier;
use farmer_sync::store::memory::{MemorySession, MemoryStore};
use farmer_sync::{
    ConnectionState, CoordinationClient, EntryBindings, EntryRole, FarmImporter, ImporterRole,
    LocalEvent, PushPolicy, ReconnectPolicy, WatcherConfig,
};
use farmer_types::{EntryPayload, FarmPath, HostIdentity};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;

const FARM: &str = "/services/db";
const NODE: &str = "/services/db/1.1.1.1";
const CONF: &str = "/srv/app/conf.json";

fn payload(value: Value) -> EntryPayload {
    EntryPayload::from_value(value).unwrap()
}

fn config() -> WatcherConfig {
    WatcherConfig {
        node_name: Some("1.1.1.1".to_string()),
        hostname: Some("zk-test".to_string()),
        ..Default::default()
    }
}

async fn import(
    session: &MemorySession,
    resource: &MemoryResource,
    notifier: &RecordingNotifier,
) -> FarmImporter {
    let bindings = EntryBindings::new(
        Arc::new(session.clone()),
        Arc::new(resource.clone()),
        Box::new(notifier.clone()),
    );
    FarmImporter::import(FarmPath::new(FARM).unwrap(), bindings, config())
        .await
        .unwrap()
}

// ── Role ─────────────────────────────────────────────────────────

#[test]
fn importer_role_policies() {
    let role = ImporterRole::new(&HostIdentity::new("1.1.1.1", "zk-test")).unwrap();

    assert_eq!(role.identity().node_name(), "1.1.1.1");
    assert!(!role.writes_local());
    assert_eq!(role.push_policy(), PushPolicy::Always);
    assert_eq!(role.reconnect_policy(), ReconnectPolicy::Recreate);

    let p = payload(json!({"enabled": "1"}));
    assert_eq!(role.normalize(p.clone()), p);
}

#[test]
fn importer_role_rejects_reserved_address() {
    assert!(ImporterRole::new(&HostIdentity::new("common", "zk-test")).is_err());
}

// ── Publishing ───────────────────────────────────────────────────

#[tokio::test]
async fn import_publishes_local_without_hostname() {
    let store = MemoryStore::new();
    let session = store.connect();
    let resource = MemoryResource::with_payload(CONF, payload(json!({"enabled": "1"})));
    let notifier = RecordingNotifier::new();

    let mut importer = import(&session, &resource, &notifier).await;
    importer.run_until_idle().await.unwrap();

    assert_eq!(store.payload(NODE), Some(payload(json!({"enabled": "1"}))));
    assert!(store.node(NODE).unwrap().1.is_ephemeral());
    assert!(resource.writes().is_empty());
}

#[tokio::test]
async fn import_of_absent_local_publishes_empty_object() {
    let store = MemoryStore::new();
    let session = store.connect();
    let resource = MemoryResource::new(CONF);
    let notifier = RecordingNotifier::new();

    let mut importer = import(&session, &resource, &notifier).await;
    importer.run_until_idle().await.unwrap();

    assert_eq!(store.payload(NODE), Some(EntryPayload::new()));
    assert!(resource.writes().is_empty());
}

#[tokio::test]
async fn import_pushes_local_changes() {
    let store = MemoryStore::new();
    let session = store.connect();
    let resource = MemoryResource::with_payload(CONF, payload(json!({"enabled": "1"})));
    let notifier = RecordingNotifier::new();
    let mut importer = import(&session, &resource, &notifier).await;
    importer.run_until_idle().await.unwrap();

    resource.set_payload(payload(json!({"enabled": "0"})));
    assert!(notifier.emit(LocalEvent::changed(CONF)));
    importer.run_until_idle().await.unwrap();

    assert_eq!(store.payload(NODE), Some(payload(json!({"enabled": "0"}))));
    assert_eq!(store.node(NODE).unwrap().1.version, 1);
}

// ── Remote changes ───────────────────────────────────────────────

#[tokio::test]
async fn remote_edit_is_never_written_locally() {
    let store = MemoryStore::new();
    let session = store.connect();
    let resource = MemoryResource::with_payload(
        CONF,
        payload(json!({"enabled": "1", "hostname": "zk-test"})),
    );
    let notifier = RecordingNotifier::new();
    let mut importer = import(&session, &resource, &notifier).await;
    importer.run_until_idle().await.unwrap();

    let other = store.connect();
    other
        .set(
            NODE,
            &payload(json!({"enabled": "0", "hostname": "zk-test"})).to_bytes(),
        )
        .await
        .unwrap();
    importer.run_until_idle().await.unwrap();

    assert!(resource.writes().is_empty());
    assert_eq!(
        importer.remote_snapshot().payload(),
        Some(&payload(json!({"enabled": "0", "hostname": "zk-test"})))
    );

    // The next local read republishes the local content.
    assert!(notifier.emit(LocalEvent::changed(CONF)));
    importer.run_until_idle().await.unwrap();
    assert_eq!(
        store.payload(NODE),
        Some(payload(json!({"enabled": "1", "hostname": "zk-test"})))
    );
}

#[tokio::test]
async fn import_reconnect_recreates_record() {
    let store = MemoryStore::new();
    let session = store.connect();
    let resource = MemoryResource::with_payload(CONF, payload(json!({"enabled": "1"})));
    let notifier = RecordingNotifier::new();
    let mut importer = import(&session, &resource, &notifier).await;
    importer.run_until_idle().await.unwrap();

    session.disconnect();
    resource.set_payload(payload(json!({"enabled": "0"})));
    assert!(notifier.emit(LocalEvent::changed(CONF)));
    importer.run_until_idle().await.unwrap();
    assert_eq!(importer.connection_state(), ConnectionState::Lost);
    assert!(store.node(NODE).is_none());

    session.reconnect();
    importer.run_until_idle().await.unwrap();
    assert_eq!(store.payload(NODE), Some(payload(json!({"enabled": "0"}))));
    assert!(resource.writes().is_empty());
}
