//! Config file loading and validation against real files.

use bubblebox_core::{AccessLevel, AccessNode, Config, ConfigError, PatternKey};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_load_written_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bubblebox.json5");
    fs::write(
        &path,
        r#"// comments and trailing commas are fine
        {
            default_profile: "desktop",
            profiles: {
                music: {
                    extends: ["desktop"],
                    home: { "Music": "read", "Downloads|Desktop": { "*.mp3": "write" } },
                },
            },
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.default_profile, "desktop");
    assert_eq!(
        config.profiles["music"].home,
        Some(AccessNode::branch([
            (PatternKey::one("Music"), AccessNode::Leaf(AccessLevel::Read)),
            (
                PatternKey::any(["Downloads", "Desktop"]),
                AccessNode::uniform(AccessLevel::Write, ["*.mp3"]),
            ),
        ]))
    );
}

#[test]
fn test_serialized_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bubblebox.json5");

    let mut config = Config::default();
    config.sandbox.readiness_timeout_secs = 0;
    config.sandbox.sort_matches = false;
    fs::write(&path, config.to_json5().unwrap()).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.readiness_timeout(), None);
    assert!(!loaded.sandbox.sort_matches);
}

#[test]
fn test_traversal_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bubblebox.json5");
    fs::write(
        &path,
        r#"{ profiles: { escape: { home: { "../other-user": "read" } } } }"#,
    )
    .unwrap();

    match Config::load(&path) {
        Err(ConfigError::Validation(msg)) => assert!(msg.contains("escape"), "{msg}"),
        other => panic!("Expected validation error, got {other:?}"),
    }
}

#[test]
fn test_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/bubblebox.json5"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_parse_invalid() {
    assert!(Config::parse("not valid json5 {").is_err());
}
