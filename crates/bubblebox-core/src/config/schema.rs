//! Configuration schema definitions.

use crate::types::AccessNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Profiles that exist without any configuration file.
pub const BUILTIN_PROFILES: &[&str] = &["default", "desktop"];

/// Main bubblebox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Executor and proxy settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Profile used when none is given on the command line.
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    /// User-defined profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            default_profile: default_profile_name(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Locations of the external programs and handshake tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Sandbox executor.
    #[serde(default = "default_bwrap")]
    pub bwrap: PathBuf,

    /// Bus filtering proxy.
    #[serde(default = "default_dbus_proxy")]
    pub dbus_proxy: PathBuf,

    /// Seconds to wait for the proxy to become ready; 0 waits forever.
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,

    /// Sort the matches of every glob so bindings are deterministic.
    #[serde(default = "default_true")]
    pub sort_matches: bool,
}

fn default_bwrap() -> PathBuf {
    PathBuf::from("/usr/bin/bwrap")
}

fn default_dbus_proxy() -> PathBuf {
    PathBuf::from("/usr/bin/xdg-dbus-proxy")
}

fn default_readiness_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            bwrap: default_bwrap(),
            dbus_proxy: default_dbus_proxy(),
            readiness_timeout_secs: default_readiness_timeout(),
            sort_matches: true,
        }
    }
}

/// A user-defined sandbox profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Profiles whose directives come first, in order.
    #[serde(default)]
    pub extends: Vec<String>,

    /// Raw sandbox executor flags.
    #[serde(default)]
    pub flags: Vec<String>,

    /// Access policy rooted at `/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<AccessNode>,

    /// Access policy rooted at the home directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<AccessNode>,

    /// Access policy rooted at `XDG_RUNTIME_DIR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<AccessNode>,

    /// Bus proxy allow-list rules (e.g. `--talk=org.freedesktop.Notifications`).
    #[serde(default)]
    pub dbus: Vec<String>,

    /// Share one runtime dir between all instances using this name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_runtime_dir: Option<String>,
}

impl ProfileConfig {
    /// Every access policy this profile declares.
    pub fn policies(&self) -> impl Iterator<Item = &AccessNode> {
        [&self.host, &self.home, &self.runtime]
            .into_iter()
            .flatten()
    }
}
