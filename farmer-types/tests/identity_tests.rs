use farmer_types::{COMMON_NODE, EntryIdentity, FarmPath, HostIdentity};

#[test]
fn private_identity_is_ephemeral_and_injects_hostname() {
    let identity = EntryIdentity::private("1.1.1.1").unwrap();
    assert!(identity.is_ephemeral());
    assert!(identity.injects_hostname());
    assert!(!identity.is_common());
    assert_eq!(identity.node_name(), "1.1.1.1");
}

#[test]
fn common_identity_is_persistent() {
    let identity = EntryIdentity::Common;
    assert!(!identity.is_ephemeral());
    assert!(!identity.injects_hostname());
    assert!(identity.is_common());
    assert_eq!(identity.node_name(), COMMON_NODE);
}

#[test]
fn private_identity_rejects_reserved_and_invalid_names() {
    assert!(EntryIdentity::private("common").is_err());
    assert!(EntryIdentity::private("").is_err());
    assert!(EntryIdentity::private("a/b").is_err());
}

#[test]
fn node_paths() {
    let farm = FarmPath::new("/services/db").unwrap();
    let private = EntryIdentity::private("1.1.1.1").unwrap();
    assert_eq!(private.node_path(&farm).unwrap(), "/services/db/1.1.1.1");
    assert_eq!(
        EntryIdentity::Common.node_path(&farm).unwrap(),
        "/services/db/common"
    );
}

#[test]
fn host_identity_overrides_win() {
    let host = HostIdentity::resolve(Some("10.1.2.3"), Some("web-01"));
    assert_eq!(host, HostIdentity::new("10.1.2.3", "web-01"));
    assert_eq!(
        host.private_entry().unwrap(),
        EntryIdentity::Private("10.1.2.3".into())
    );
}

#[test]
fn host_identity_resolves_something() {
    let host = HostIdentity::resolve(None, None);
    assert!(!host.address.is_empty());
    assert!(!host.hostname.is_empty());
    assert!(host.address.parse::<std::net::IpAddr>().is_ok());
}
