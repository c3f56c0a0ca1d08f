use std::io::Write;
use std::time::Duration;

use smk_config::{load_layered_yaml, load_layered_yaml_from_strings, DaemonConfig, PushKind, StoreKind};

#[test]
fn empty_config_yields_defaults() {
    let loaded = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let cfg = DaemonConfig::from_loaded(&loaded).unwrap();

    assert_eq!(cfg, DaemonConfig::default());
    assert_eq!(cfg.heartbeat_ttl(), Duration::from_secs(13));
    assert_eq!(cfg.token_ttl(), Duration::from_secs(604_800));
    assert_eq!(cfg.ping_interval(), Duration::from_secs(5));
    assert_eq!(cfg.store.kind, StoreKind::Memory);
    assert_eq!(cfg.push.kind, PushKind::Log);
    assert!(cfg.is_principal("app"));
    assert!(cfg.is_principal("firmware"));
    assert!(!cfg.is_principal("root"));
}

#[test]
fn layered_files_override_in_order() {
    let mut base = tempfile::NamedTempFile::new().unwrap();
    writeln!(base, "environment: staging\nheartbeat:\n  interval_secs: 20").unwrap();
    let mut local = tempfile::NamedTempFile::new().unwrap();
    writeln!(local, "heartbeat:\n  ttl_factor: 1.5").unwrap();

    let loaded = load_layered_yaml(&[base.path(), local.path()]).unwrap();
    let cfg = DaemonConfig::from_loaded(&loaded).unwrap();

    assert_eq!(cfg.environment, "staging");
    assert_eq!(cfg.token_key_prefix(), "token-staging:");
    assert_eq!(cfg.heartbeat_ttl(), Duration::from_secs(30));
}

#[test]
fn missing_file_is_an_error() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(format!("{err:#}").contains("failed to read yaml path"));
}

#[test]
fn redis_without_url_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&["store:\n  kind: redis\n"]).unwrap();
    let err = DaemonConfig::from_loaded(&loaded).unwrap_err();
    assert!(err.to_string().contains("store.url"));
}

#[test]
fn http_push_without_endpoint_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&["push:\n  kind: http\n"]).unwrap();
    assert!(DaemonConfig::from_loaded(&loaded).is_err());
}

#[test]
fn ttl_factor_below_one_is_rejected() {
    let loaded = load_layered_yaml_from_strings(&["heartbeat:\n  ttl_factor: 0.5\n"]).unwrap();
    assert!(DaemonConfig::from_loaded(&loaded).is_err());
}

#[test]
fn unknown_store_kind_is_a_schema_error() {
    let loaded = load_layered_yaml_from_strings(&["store:\n  kind: etcd\n"]).unwrap();
    let err = DaemonConfig::from_loaded(&loaded).unwrap_err();
    assert!(format!("{err:#}").contains("daemon schema"));
}
