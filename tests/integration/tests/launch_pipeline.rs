//! End-to-end launch preparation.
//!
//! Config file text goes in, a final executor command line comes out, with a
//! real (scripted) bus proxy spawned and torn down along the way.

use bubblebox_integration_tests::{contains_seq, s, spawn_lock, Session, FAKE_PROXY};
use bubblebox_sandbox::{Launcher, ProfileResolver, SandboxError};
use std::fs;

const BROWSER: &str = r#"{
    sandbox: { bwrap: "/usr/bin/bwrap", dbus_proxy: "@PROXY@", readiness_timeout_secs: 5 },
    default_profile: "browser",
    profiles: {
        browser: {
            extends: ["default"],
            flags: ["--setenv", "MOZ_ENABLE_WAYLAND", "1"],
            home: {
                "projects": { "*": "write" },
                ".config/app|.local/share/app": "read",
            },
            runtime: { "wayland-*": "read" },
            dbus: ["--talk=org.mozilla.firefox.*"],
            shared_runtime_dir: "browser",
        },
        notifier: {
            extends: ["browser"],
            dbus: ["--talk=org.freedesktop.Notifications"],
        },
    },
}"#;

fn target() -> Vec<String> {
    vec!["firefox".to_string(), "--new-window".to_string()]
}

fn browser_session() -> Session {
    let session = Session::new();
    session.mkdir_home("projects/site");
    session.mkdir_home("projects/api");
    session.mkdir_home(".config/app");
    session.mkdir_home(".local/share/app");
    fs::write(session.env.runtime_dir.join("wayland-0"), "").unwrap();
    session
}

#[test]
fn test_configured_profile_end_to_end() {
    let session = browser_session();
    let proxy = session.write_script("proxy", FAKE_PROXY);
    let config = session.config(BROWSER, Some(&proxy));
    let env = &session.env;

    let tree = ProfileResolver::new(&config, env).resolve("notifier").unwrap();
    let _guard = spawn_lock();
    let plan = Launcher::from_config(&config, env).prepare(&tree, &target()).unwrap();
    let argv = plan.argv();

    assert_eq!(argv[0], "/usr/bin/bwrap");
    assert_eq!(argv[1], "--die-with-parent");
    assert_eq!(argv[2], "--unshare-all");

    // Globbed binds, sorted within a pattern, declaration order across keys.
    let api = env.home.join("projects/api");
    let site = env.home.join("projects/site");
    let config_app = env.home.join(".config/app");
    let share_app = env.home.join(".local/share/app");
    assert!(contains_seq(
        argv,
        &[
            "--bind", s(&api), s(&api),
            "--bind", s(&site), s(&site),
            "--ro-bind", s(&config_app), s(&config_app),
            "--ro-bind", s(&share_app), s(&share_app),
        ]
    ));
    let wayland = env.runtime_dir.join("wayland-0");
    assert!(contains_seq(argv, &["--ro-bind", s(&wayland), s(&wayland)]));
    let shared = env.scratch_dir().join("browser");
    assert!(contains_seq(argv, &["--bind", s(&shared), s(&env.runtime_dir)]));

    // Proxy arguments come last, right before the separator.
    let proxy_handle = plan.proxy().unwrap();
    let socket = proxy_handle.socket_path().to_path_buf();
    let sync = proxy_handle.sync_fd().unwrap().to_string();
    let bus = env.sandbox_bus_path();
    let tail = &argv[argv.len() - 8..];
    assert_eq!(
        tail,
        ["--bind", s(&socket), s(&bus), "--sync-fd", sync.as_str(), "--", "firefox", "--new-window"]
    );

    // One proxy with the union of both allow-lists, parent rules first.
    let recorded = fs::read_to_string(format!("{}.args", s(&socket))).unwrap();
    let lines: Vec<&str> = recorded.lines().collect();
    assert_eq!(
        &lines[1..],
        [
            "unix:path=/nonexistent/bus",
            s(&socket),
            "--filter",
            "--talk=org.mozilla.firefox.*",
            "--talk=org.freedesktop.Notifications",
        ]
    );

    drop(plan);
    assert!(!socket.exists());
}

#[test]
fn test_tree_reused_for_two_launches() {
    let session = browser_session();
    let proxy = session.write_script("proxy", FAKE_PROXY);
    let config = session.config(BROWSER, Some(&proxy));

    let tree = ProfileResolver::new(&config, &session.env).resolve("browser").unwrap();
    let launcher = Launcher::from_config(&config, &session.env);

    let _guard = spawn_lock();
    let first = launcher.prepare(&tree, &target()).unwrap();
    let second = launcher.prepare(&tree, &target()).unwrap();

    let a = first.proxy().unwrap().socket_path();
    let b = second.proxy().unwrap().socket_path();
    assert_ne!(a, b);
    assert!(a.exists() && b.exists());

    // Everything but the proxy tokens is identical.
    let strip = |argv: &[String]| -> Vec<String> {
        let at = argv.iter().position(|t| t == "--sync-fd").unwrap();
        argv[..at - 3].to_vec()
    };
    assert_eq!(strip(first.argv()), strip(second.argv()));
}

#[test]
fn test_unmatched_pattern_fails_before_proxy() {
    let session = Session::new();
    session.mkdir_home("projects/site");
    let proxy = session.write_script("proxy", FAKE_PROXY);
    let config = session.config(BROWSER, Some(&proxy));

    let err = ProfileResolver::new(&config, &session.env)
        .resolve("browser")
        .unwrap_err();
    assert!(matches!(err, SandboxError::NoMatches(_)), "{err}");
    assert!(err.is_configuration_error());
    assert!(session.scratch_entries().is_empty());
}

#[test]
fn test_hung_proxy_times_out() {
    let session = browser_session();
    let proxy = session.write_script("proxy", "exec sleep 30");
    let config = session.config(
        r#"{
            sandbox: { dbus_proxy: "@PROXY@", readiness_timeout_secs: 1 },
            profiles: { chat: { dbus: ["--talk=org.example.Chat"] } },
        }"#,
        Some(&proxy),
    );

    let tree = ProfileResolver::new(&config, &session.env).resolve("chat").unwrap();
    let _guard = spawn_lock();
    let err = Launcher::from_config(&config, &session.env)
        .prepare(&tree, &target())
        .unwrap_err();
    assert!(matches!(err, SandboxError::ProxyTimeout(_)), "{err}");
    assert!(err.is_protocol_error());
    assert!(session.scratch_entries().is_empty());
}

#[test]
fn test_missing_bus_address_is_configuration_error() {
    let mut session = Session::new();
    session.env.bus_address = None;
    let config = session.config(
        r#"{ profiles: { chat: { dbus: ["--talk=org.example.Chat"] } } }"#,
        None,
    );

    let tree = ProfileResolver::new(&config, &session.env).resolve("chat").unwrap();
    let err = Launcher::from_config(&config, &session.env)
        .prepare(&tree, &target())
        .unwrap_err();
    assert!(err.is_configuration_error(), "{err}");
}
