//! Launch driver.
//!
//! Wraps a directive tree with the mandatory flags, traverses it, runs the
//! finalizers and finally replaces the current process with the sandbox
//! executor. Nothing of this process survives a successful launch except the
//! descriptors deliberately marked inheritable.

use crate::access::path_arg;
use crate::directive::{Directive, Invocation};
use crate::error::SandboxError;
use crate::proxy::{ProxyCoordinator, ProxyHandle, ProxyLauncher, ProxySettings};
use crate::Result;
use bubblebox_core::{Config, SessionEnv};
use std::borrow::Cow;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Kill the sandboxed process when the launcher dies.
pub const DIE_WITH_PARENT: &str = "--die-with-parent";

/// Separates executor flags from the target program.
pub const SEPARATOR: &str = "--";

/// Glues directives, the proxy and the executor together.
#[derive(Debug, Clone)]
pub struct Launcher {
    executor: PathBuf,
    proxy: ProxyCoordinator,
}

impl Launcher {
    /// Create a launcher for the given executor.
    pub fn new(executor: impl Into<PathBuf>, proxy: ProxyCoordinator) -> Self {
        Self {
            executor: executor.into(),
            proxy,
        }
    }

    /// Launcher for the current session.
    pub fn from_config(config: &Config, env: &SessionEnv) -> Self {
        Self::new(
            config.sandbox.bwrap.clone(),
            ProxyCoordinator::new(ProxySettings::from_config(config, env)),
        )
    }

    /// Build the final argument list, starting the proxy if one is requested.
    pub fn prepare(&self, tree: &Directive, target: &[String]) -> Result<LaunchPlan> {
        self.prepare_with(tree, target, &self.proxy)
    }

    /// Like [`prepare`](Self::prepare) with a custom proxy launcher.
    pub fn prepare_with(
        &self,
        tree: &Directive,
        target: &[String],
        proxy: &dyn ProxyLauncher,
    ) -> Result<LaunchPlan> {
        if target.is_empty() {
            return Err(SandboxError::config("no program given"));
        }
        let executor = path_arg(&self.executor)?;

        let wrapped = Directive::group([Directive::flags([DIE_WITH_PARENT]), tree.clone()]);
        let mut invocation = Invocation::new();
        invocation.traverse(&wrapped);
        let finalized = invocation.finalize(proxy)?;

        let mut argv = Vec::with_capacity(finalized.args.len() + target.len() + 2);
        argv.push(executor);
        argv.extend(finalized.args);
        argv.push(SEPARATOR.to_string());
        argv.extend(target.iter().cloned());
        debug!("Sandbox command line: {:?}", argv);

        Ok(LaunchPlan {
            argv,
            proxy: finalized.proxy,
        })
    }

    /// Prepare and exec; only returns on failure.
    pub fn launch(&self, tree: &Directive, target: &[String]) -> SandboxError {
        match self.prepare(tree, target) {
            Ok(plan) => plan.exec(),
            Err(e) => e,
        }
    }
}

/// A fully prepared launch, ready to replace the current process.
#[derive(Debug)]
pub struct LaunchPlan {
    argv: Vec<String>,
    proxy: Option<ProxyHandle>,
}

impl LaunchPlan {
    /// The executor followed by all of its arguments.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The proxy started for this launch, if any.
    pub fn proxy(&self) -> Option<&ProxyHandle> {
        self.proxy.as_ref()
    }

    /// The argument list as a single POSIX shell command line.
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replace the current process with the sandbox executor.
    ///
    /// Returns only if the exec itself failed; the proxy is stopped then.
    pub fn exec(self) -> SandboxError {
        let Self { argv, proxy } = self;
        let Some((program, args)) = argv.split_first() else {
            return SandboxError::config("empty command line");
        };

        info!("Executing {} with {} argument(s)", program, args.len());
        let source = Command::new(program).args(args).exec();

        // Still here, so the sandbox never started.
        drop(proxy);
        SandboxError::LaunchFailed {
            program: PathBuf::from(program),
            source,
        }
    }
}

/// Quote `arg` for a POSIX shell if it needs it.
fn shell_quote(arg: &str) -> Cow<'_, str> {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        Cow::Borrowed(arg)
    } else {
        // Single quotes cannot be escaped inside single quotes; close, emit
        // a double-quoted one, and reopen.
        Cow::Owned(format!("'{}'", arg.replace('\'', r#"'"'"'"#)))
    }
}
