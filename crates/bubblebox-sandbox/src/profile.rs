//! Sandbox profiles.
//!
//! Two profiles are built in: `default`, a minimal box that can run a shell,
//! and `desktop`, which adds what graphical applications need. Further
//! profiles come from the configuration file and may extend either.

use crate::access::{dev_host_access, host_access, path_arg, ro_host_access, AccessExpander};
use crate::directive::Directive;
use crate::error::SandboxError;
use crate::Result;
use bubblebox_core::config::ProfileConfig;
use bubblebox_core::{paths, AccessLevel, Config, SessionEnv};
use std::path::Path;
use tracing::debug;

/// Name of the minimal built-in profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Name of the graphical built-in profile.
pub const DESKTOP_PROFILE: &str = "desktop";

/// Bus services every desktop application may talk to.
const DESKTOP_BUS_RULES: &[&str] = &[
    "--talk=org.kde.StatusNotifierWatcher.*",
    "--talk=org.freedesktop.Notifications.*",
    "--talk=org.freedesktop.ScreenSaver.*",
    "--talk=org.freedesktop.portal.*",
    // Opening links in the browser
    "--talk=org.mozilla.firefox.*",
];

/// The minimal profile: fresh namespaces (except the network), a skeleton
/// filesystem, read-only system directories and enough of `$HOME` for a shell.
pub fn default_profile(env: &SessionEnv, expander: &AccessExpander) -> Result<Directive> {
    let runtime_dir = path_arg(&env.runtime_dir)?;

    Ok(Directive::group([
        Directive::flags(["--unshare-all", "--share-net", "--hostname", "bwrapped"]),
        Directive::flags([
            "--proc", "/proc", "--dev", "/dev", "--dir", "/tmp", "--dir", "/var", "--dir", "/run",
            "--symlink", "../run", "/var/run",
        ]),
        // Empty, private runtime dir
        Directive::flags([
            "--perms".to_string(),
            "0700".to_string(),
            "--dir".to_string(),
            runtime_dir,
        ]),
        // merged-usr
        Directive::flags([
            "--symlink", "usr/lib", "/lib", "--symlink", "usr/lib64", "/lib64", "--symlink",
            "usr/bin", "/bin", "--symlink", "usr/sbin", "/sbin",
        ]),
        ro_host_access(["/usr", "/sys", "/etc"])?,
        expander.optional_directive(
            &env.home,
            AccessLevel::Read,
            [".bashrc", ".bash_aliases", ".profile", "bin"],
        )?,
    ]))
}

/// The default profile plus display, audio and a few harmless bus services.
pub fn desktop_profile(env: &SessionEnv, expander: &AccessExpander) -> Result<Directive> {
    let mut display = vec![Path::new("/tmp/.X11-unix")];
    if let Some(xauthority) = &env.xauthority {
        display.push(xauthority);
    }

    Ok(Directive::group([
        default_profile(env, expander)?,
        dev_host_access(["/dev/dri", "/dev/snd"])?,
        ro_host_access(display)?,
        expander.optional_directive(&env.runtime_dir, AccessLevel::Read, ["wayland*", "pulse"])?,
        expander.optional_directive(
            &env.home,
            AccessLevel::Read,
            [
                ".config/fontconfig",
                ".XCompose",
                ".mozilla/firefox/profiles.ini",
                ".local/share/applications",
            ],
        )?,
        Directive::proxy_flags(DESKTOP_BUS_RULES.iter().copied()),
    ]))
}

/// Share one runtime dir between every box launched under `name`.
///
/// The directory lives in the scratch dir and is created on first use.
pub fn shared_runtime_dir(env: &SessionEnv, name: &str) -> Result<Directive> {
    if !paths::is_valid_box_name(name) {
        return Err(SandboxError::config(format!(
            "invalid shared runtime dir name '{}'",
            name
        )));
    }
    let dir = paths::ensure_dir(&env.scratch_dir().join(name))?;
    Ok(Directive::flags([
        "--bind".to_string(),
        path_arg(&dir)?,
        path_arg(&env.runtime_dir)?,
    ]))
}

/// Turns profile names into directive trees.
#[derive(Debug)]
pub struct ProfileResolver<'a> {
    config: &'a Config,
    env: &'a SessionEnv,
    expander: AccessExpander,
}

impl<'a> ProfileResolver<'a> {
    /// Create a resolver for `config` in the given session.
    pub fn new(config: &'a Config, env: &'a SessionEnv) -> Self {
        Self {
            config,
            env,
            expander: AccessExpander::new().with_sorted_matches(config.sandbox.sort_matches),
        }
    }

    /// Resolve a profile by name.
    ///
    /// Configured profiles shadow built-in ones of the same name.
    pub fn resolve(&self, name: &str) -> Result<Directive> {
        self.resolve_inner(name, &mut Vec::new())
    }

    fn resolve_inner(&self, name: &str, chain: &mut Vec<String>) -> Result<Directive> {
        if chain.iter().any(|n| n == name) {
            return Err(SandboxError::config(format!(
                "profile '{}' extends itself via {}",
                name,
                chain.join(" -> ")
            )));
        }

        if let Some(profile) = self.config.profiles.get(name) {
            chain.push(name.to_string());
            let resolved = self.configured(profile, chain);
            chain.pop();
            debug!("Resolved configured profile '{}'", name);
            return resolved;
        }

        match name {
            DEFAULT_PROFILE => default_profile(self.env, &self.expander),
            DESKTOP_PROFILE => desktop_profile(self.env, &self.expander),
            _ => Err(SandboxError::UnknownProfile(name.to_string())),
        }
    }

    fn configured(&self, profile: &ProfileConfig, chain: &mut Vec<String>) -> Result<Directive> {
        let mut parts = Vec::new();
        for parent in &profile.extends {
            parts.push(self.resolve_inner(parent, chain)?);
        }

        if !profile.flags.is_empty() {
            parts.push(Directive::flags(profile.flags.iter().cloned()));
        }
        if let Some(host) = &profile.host {
            parts.push(self.expander.directive(Path::new("/"), host)?);
        }
        if let Some(home) = &profile.home {
            parts.push(host_access(&self.expander.expand_home(self.env, home)?)?);
        }
        if let Some(runtime) = &profile.runtime {
            parts.push(host_access(&self.expander.expand_runtime(self.env, runtime)?)?);
        }
        if !profile.dbus.is_empty() {
            parts.push(Directive::proxy_flags(profile.dbus.iter().cloned()));
        }
        if let Some(shared) = &profile.shared_runtime_dir {
            parts.push(shared_runtime_dir(self.env, shared)?);
        }

        Ok(Directive::group(parts))
    }
}
