//! Sandboxed program launches with bubblewrap.
//!
//! This crate turns composable launch policy into a single executor command
//! line and then replaces the current process with it:
//!
//! - **Directives**: a reusable tree of executor flags and bus allow-list rules
//! - **Access expansion**: declarative host path policies globbed into binds
//! - **Bus proxy**: a filtered session bus, ready before the sandbox starts
//! - **Profiles**: built-in and configured directive trees
//! - **Launch**: traversal, finalization and exec

pub mod access;
pub mod directive;
pub mod error;
pub mod launch;
pub mod profile;
pub mod proxy;

pub use access::{
    dev_host_access, host_access, ro_host_access, rw_host_access, AccessExpander, Binding,
};
pub use directive::{Directive, Finalized, Finalizer, Invocation};
pub use error::SandboxError;
pub use launch::{LaunchPlan, Launcher};
pub use profile::{default_profile, desktop_profile, shared_runtime_dir, ProfileResolver};
pub use proxy::{ProxyCoordinator, ProxyHandle, ProxyLauncher, ProxySettings};

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
