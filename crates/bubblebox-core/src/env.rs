//! Environment variable handling.

use crate::error::ConfigError;
use crate::paths;
use std::env;
use std::path::PathBuf;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Common environment variable names.
pub mod vars {
    /// Home directory of the invoking user.
    pub const HOME: &str = "HOME";

    /// Per-session runtime directory.
    pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";

    /// Address of the session message bus.
    pub const DBUS_SESSION_BUS_ADDRESS: &str = "DBUS_SESSION_BUS_ADDRESS";

    /// X11 authority file.
    pub const XAUTHORITY: &str = "XAUTHORITY";

    /// Config file override.
    pub const BUBBLEBOX_CONFIG: &str = "BUBBLEBOX_CONFIG";
}

/// The parts of the invoking session a launch depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnv {
    /// Home directory of the invoking user.
    pub home: PathBuf,

    /// Per-session runtime directory (`XDG_RUNTIME_DIR`).
    pub runtime_dir: PathBuf,

    /// Upstream session bus address; only needed once a proxy is requested.
    pub bus_address: Option<String>,

    /// X11 authority file, if the session has one.
    pub xauthority: Option<PathBuf>,
}

impl SessionEnv {
    /// Read the session environment of the current process.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(get_var)
    }

    /// Build the session environment from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup(vars::HOME).ok_or(ConfigError::MissingEnv(vars::HOME))?;
        let runtime_dir = lookup(vars::XDG_RUNTIME_DIR)
            .ok_or(ConfigError::MissingEnv(vars::XDG_RUNTIME_DIR))?;

        Ok(Self {
            home: PathBuf::from(home),
            runtime_dir: PathBuf::from(runtime_dir),
            bus_address: lookup(vars::DBUS_SESSION_BUS_ADDRESS),
            xauthority: lookup(vars::XAUTHORITY).map(PathBuf::from),
        })
    }

    /// Directory holding generated proxy sockets and shared runtime dirs.
    pub fn scratch_dir(&self) -> PathBuf {
        paths::scratch_dir(&self.runtime_dir)
    }

    /// Where the session bus lives inside the sandbox.
    pub fn sandbox_bus_path(&self) -> PathBuf {
        self.runtime_dir.join("bus")
    }
}
