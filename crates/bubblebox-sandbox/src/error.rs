//! Sandbox error types.

use bubblebox_core::{ConfigError, PolicyError};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while preparing or starting a sandbox launch.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Access policy rejected before touching the filesystem.
    #[error("Invalid access policy: {0}")]
    Policy(#[from] PolicyError),

    /// A pattern the glob engine cannot parse.
    #[error("Invalid glob pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A pattern that matched nothing on the host.
    #[error("Pattern `{0}` matched no paths")]
    NoMatches(String),

    /// Paths are passed to the executor as UTF-8 arguments.
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile name that is neither built in nor configured.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// The executor or the proxy could not be started.
    #[error("Failed to launch {}: {source}", .program.display())]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The proxy did not signal readiness in time.
    #[error("Bus proxy not ready after {0:?}")]
    ProxyTimeout(Duration),

    /// The readiness handshake broke down.
    #[error("Bus proxy handshake failed: {0}")]
    Protocol(String),
}

impl SandboxError {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether this error was caused by the launch configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Policy(_)
                | Self::InvalidPattern { .. }
                | Self::NoMatches(_)
                | Self::NonUtf8Path(_)
                | Self::Config(_)
                | Self::UnknownProfile(_)
        )
    }

    /// Whether this error came from the proxy readiness handshake.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::ProxyTimeout(_) | Self::Protocol(_))
    }

    /// Exit status a shell would report for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::LaunchFailed { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            Self::LaunchFailed { .. } => 126,
            _ => 1,
        }
    }
}

impl From<ConfigError> for SandboxError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}
