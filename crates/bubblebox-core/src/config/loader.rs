//! Configuration loading and validation.

use super::{Config, BUILTIN_PROFILES};
use crate::error::ConfigError;
use crate::paths;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

impl Config {
    /// Load configuration from the default path, falling back to defaults if no file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        match Self::load(&path) {
            Err(ConfigError::NotFound(_)) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Load configuration from an explicit path, or the default location.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Executor paths
        if self.sandbox.bwrap.as_os_str().is_empty() {
            errors.push("sandbox.bwrap must not be empty".to_string());
        }
        if self.sandbox.dbus_proxy.as_os_str().is_empty() {
            errors.push("sandbox.dbus_proxy must not be empty".to_string());
        }

        // 2. Default profile must exist
        if !self.has_profile(&self.default_profile) {
            errors.push(format!(
                "Default profile '{}' is neither built in nor configured",
                self.default_profile
            ));
        }

        for (name, profile) in &self.profiles {
            // 3. Parents must exist
            for parent in &profile.extends {
                if !self.has_profile(parent) {
                    errors.push(format!(
                        "Profile '{}' extends unknown profile '{}'",
                        name, parent
                    ));
                }
            }

            // 4. No traversal anywhere in the policies
            for policy in profile.policies() {
                if let Err(e) = policy.validate() {
                    errors.push(format!("Profile '{}': {}", name, e));
                }
            }

            // 5. Shared runtime dir names stay inside the scratch dir
            if let Some(shared) = &profile.shared_runtime_dir {
                if !paths::is_valid_box_name(shared) {
                    errors.push(format!(
                        "Profile '{}': invalid shared_runtime_dir '{}'",
                        name, shared
                    ));
                }
            }
        }

        // 6. Inheritance must be acyclic
        for name in self.profiles.keys() {
            if self.extends_cycle(name) {
                errors.push(format!("Profile '{}' extends itself", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Whether `name` is a built-in or configured profile.
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.contains_key(name) || BUILTIN_PROFILES.contains(&name)
    }

    /// Handshake timeout, or `None` to wait forever.
    pub fn readiness_timeout(&self) -> Option<Duration> {
        match self.sandbox.readiness_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn extends_cycle(&self, start: &str) -> bool {
        let mut stack: Vec<&str> = vec![start];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            let Some(profile) = self.profiles.get(current) else {
                continue;
            };
            for parent in &profile.extends {
                if parent == start {
                    return true;
                }
                if seen.insert(parent.as_str()) {
                    stack.push(parent);
                }
            }
        }
        false
    }
}
