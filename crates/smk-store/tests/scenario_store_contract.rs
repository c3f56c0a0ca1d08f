//! Scenario: the store contract the daemon relies on, exercised through a
//! `dyn KeyValueStore` so only trait behaviour is under test.
//!
//! - JSON helpers: absent keys are `None`, undecodable values are errors.
//! - `delete` counts only keys that existed.
//! - `set` drops a previous TTL; `expire` on a missing key reports `false`.
//! - Every subscriber sees an expiry, and sees it once.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smk_store::{get_json, set_json, KeyValueStore, MemoryStore};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Probe {
    name: String,
    reading: i64,
}

fn store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn json_helpers_distinguish_absent_from_corrupt() {
    let s = store();

    let missing: Option<Probe> = get_json(s.as_ref(), "probe").await.unwrap();
    assert!(missing.is_none());

    let p = Probe {
        name: "brisket".to_string(),
        reading: 187,
    };
    set_json(s.as_ref(), "probe", &p).await.unwrap();
    let back: Option<Probe> = get_json(s.as_ref(), "probe").await.unwrap();
    assert_eq!(back, Some(p));

    s.set("probe", "not json").await.unwrap();
    let err = get_json::<Probe>(s.as_ref(), "probe").await.unwrap_err();
    assert!(format!("{err:#}").contains("probe"), "error names the key: {err:#}");
}

#[tokio::test]
async fn delete_counts_existing_keys_only() {
    let s = store();
    s.set("a", "1").await.unwrap();
    s.set("b", "1").await.unwrap();

    assert_eq!(s.delete(&["a", "b", "c"]).await.unwrap(), 2);
    assert_eq!(s.delete(&["a"]).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn plain_set_drops_ttl_and_expire_needs_a_key() {
    let s = store();
    s.set_ex("k", "v", Duration::from_secs(5)).await.unwrap();
    assert!(s.ttl("k").await.unwrap().is_some());

    s.set("k", "w").await.unwrap();
    assert_eq!(s.ttl("k").await.unwrap(), None);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(s.get("k").await.unwrap().as_deref(), Some("w"));

    assert!(!s.expire("missing", Duration::from_secs(1)).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn every_subscriber_sees_each_expiry_once() {
    let s = store();
    let mut first = s.expired_events();
    let mut second = s.expired_events();

    s.set_ex("online", "1", Duration::from_secs(13)).await.unwrap();
    tokio::time::advance(Duration::from_secs(14)).await;

    // Two accesses; only the first one evicts.
    assert!(!s.exists("online").await.unwrap());
    assert!(!s.exists("online").await.unwrap());

    assert_eq!(first.try_recv().unwrap(), "online");
    assert_eq!(second.try_recv().unwrap(), "online");
    assert!(first.try_recv().is_err());
    assert!(second.try_recv().is_err());
}
