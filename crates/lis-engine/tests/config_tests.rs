//! Configuration file loading

use lis_engine::{Actor, EngineConfig, EngineError};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
base_url = "https://lis.example.org"
request_timeout_secs = 10
"#,
    );
    let config = EngineConfig::load(file.path()).unwrap();

    assert_eq!(config.base_url, "https://lis.example.org");
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.api_prefix, "/rest");
    assert_eq!(
        config.endpoint("/storage/rooms"),
        "https://lis.example.org/rest/storage/rooms"
    );
}

#[test]
fn test_custom_admin_roles() {
    let file = write_config(r#"admin_roles = ["Lab Director"]"#);
    let config = EngineConfig::load(file.path()).unwrap();

    assert!(Actor::with_roles(["Lab Director"]).is_admin(&config));
    assert!(!Actor::with_roles(["Global Administrator"]).is_admin(&config));
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config("request_timeout_secs = 0");
    assert!(matches!(EngineConfig::load(file.path()), Err(EngineError::Config(_))));

    let file = write_config(r#"base_url = "ftp://lis""#);
    assert!(matches!(EngineConfig::load(file.path()), Err(EngineError::Config(_))));
}

#[test]
fn test_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    match EngineConfig::load(&path) {
        Err(EngineError::Config(message)) => assert!(message.contains("absent.toml")),
        other => panic!("unexpected result {other:?}"),
    }
}
