//! Shared fixtures for the integration tests.

use bubblebox_core::{Config, SessionEnv};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Serialises script writes and process spawns across test threads.
pub fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// A proxy stand-in: records its arguments, creates the socket, signals.
pub const FAKE_PROXY: &str = r#"fd="${1#--fd=}"
printf '%s\n' "$@" > "$3.args"
touch "$3"
printf x >&"$fd"
exec sleep 30"#;

/// A throwaway login session with its own home and runtime dir.
pub struct Session {
    dir: TempDir,
    pub env: SessionEnv,
}

impl Session {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let runtime_dir = dir.path().join("run");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&runtime_dir).unwrap();
        bubblebox_core::paths::ensure_scratch_dir(&runtime_dir).unwrap();

        let env = SessionEnv {
            home,
            runtime_dir,
            bus_address: Some("unix:path=/nonexistent/bus".to_string()),
            xauthority: None,
        };
        Self { dir, env }
    }

    /// Absolute path of `rel` inside the session dir.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Create an empty file (and its parents) below the home dir.
    pub fn touch_home(&self, rel: &str) -> PathBuf {
        let path = self.env.home.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        path
    }

    /// Create a directory below the home dir.
    pub fn mkdir_home(&self, rel: &str) -> PathBuf {
        let path = self.env.home.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// Write an executable shell script into the session dir.
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path(name);
        let _guard = spawn_lock();
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Parse and validate a JSON5 config, substituting `@PROXY@` with `proxy`.
    pub fn config(&self, json5: &str, proxy: Option<&Path>) -> Config {
        let text = match proxy {
            Some(p) => json5.replace("@PROXY@", p.to_str().unwrap()),
            None => json5.to_string(),
        };
        let config = Config::parse(&text).unwrap();
        config.validate().unwrap();
        config
    }

    /// Entries currently in the scratch dir.
    pub fn scratch_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.env.scratch_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `needle` occurs as a contiguous run inside `haystack`.
pub fn contains_seq(haystack: &[String], needle: &[&str]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
}

/// UTF-8 view of a test path.
pub fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}
