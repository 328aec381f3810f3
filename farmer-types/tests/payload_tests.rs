use farmer_types::{EntryPayload, Error};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Value, json};

fn payload(value: Value) -> EntryPayload {
    EntryPayload::from_value(value).unwrap()
}

#[test]
fn canonical_form_sorts_keys_at_every_level() {
    let p = payload(json!({"b": 1, "a": {"z": true, "y": [3, {"d": null, "c": "x"}]}}));
    assert_eq!(
        p.canonical(),
        r#"{"a":{"y":[3,{"c":"x","d":null}],"z":true},"b":1}"#
    );
}

#[test]
fn equality_ignores_insertion_order() {
    let mut a = EntryPayload::new();
    a.insert("enabled", "1");
    a.insert("hostname", "web-01");

    let mut b = EntryPayload::new();
    b.insert("hostname", "web-01");
    b.insert("enabled", "1");

    assert_eq!(a, b);
}

#[test]
fn equality_is_type_sensitive() {
    assert_ne!(payload(json!({"enabled": "1"})), payload(json!({"enabled": 1})));
}

#[test]
fn bytes_are_canonical_json() {
    let p = payload(json!({"hostname": "h", "enabled": "1"}));
    assert_eq!(p.to_bytes(), br#"{"enabled":"1","hostname":"h"}"#.to_vec());
    assert_eq!(EntryPayload::from_bytes(&p.to_bytes()).unwrap(), p);
}

#[test]
fn from_bytes_rejects_non_objects() {
    assert!(matches!(
        EntryPayload::from_bytes(b"[1,2]"),
        Err(Error::NotAnObject("an array"))
    ));
    assert!(matches!(
        EntryPayload::from_bytes(b"null"),
        Err(Error::NotAnObject("null"))
    ));
    assert!(matches!(
        EntryPayload::from_bytes(b"{not json"),
        Err(Error::Serialization(_))
    ));
}

#[test]
fn with_field_overrides_existing_value() {
    let p = payload(json!({"enabled": "1", "hostname": "old"})).with_field("hostname", "new");
    assert_eq!(p.get("hostname"), Some(&json!("new")));
    assert_eq!(p.len(), 2);
}

#[test]
fn collect_from_pairs() {
    let p: EntryPayload = [("a", "1"), ("b", "2")].into_iter().collect();
    assert_eq!(p, payload(json!({"b": "2", "a": "1"})));
    assert!(!p.is_empty());
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

fn payload_strategy() -> impl Strategy<Value = EntryPayload> {
    let value = leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    });
    prop::collection::btree_map("[a-z]{1,8}", value, 0..6)
        .prop_map(|m| m.into_iter().collect::<EntryPayload>())
}

proptest! {
    #[test]
    fn canonical_bytes_decode_to_equal_payload(p in payload_strategy()) {
        let decoded = EntryPayload::from_bytes(&p.to_bytes()).unwrap();
        prop_assert_eq!(decoded.canonical(), p.canonical());
        prop_assert_eq!(decoded, p);
    }

    #[test]
    fn reversed_insertion_order_is_equal(p in payload_strategy()) {
        let mut pairs: Vec<(String, Value)> =
            p.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        pairs.reverse();
        let reversed: EntryPayload = pairs.into_iter().collect();
        prop_assert_eq!(reversed, p);
    }
}
