//! Bus filtering proxy coordination.
//!
//! The proxy is started once per launch, after the directive tree has been
//! traversed, with the union of every requested allow-list rule. A pipe
//! connects the two processes:
//!
//! 1. The proxy gets the write end and writes a byte (or closes it) once its
//!    socket is listening.
//! 2. We block on the read end until then, and check that the socket exists.
//! 3. The read end is handed to the sandbox executor via `--sync-fd`. The
//!    executor holds it open for the lifetime of the sandbox; when it closes,
//!    the proxy sees the hang-up and exits.

use crate::access::path_arg;
use crate::error::SandboxError;
use crate::Result;
use bubblebox_core::{Config, SessionEnv};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe2;
use rand::distributions::Uniform;
use rand::Rng;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// File name prefix of generated proxy sockets.
pub const SOCKET_PREFIX: &str = "bus-";

/// Length of the random socket name suffix.
const SOCKET_SUFFIX_LEN: usize = 8;

/// How often to look for the socket after the readiness signal.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Starts a bus proxy for a finished traversal.
pub trait ProxyLauncher {
    /// Start one proxy carrying `allow_list` and wait until it is ready.
    fn launch(&self, allow_list: &[String]) -> Result<ProxyHandle>;
}

/// Everything the coordinator needs to know about the session.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Proxy executable.
    pub program: PathBuf,

    /// Upstream bus address; only required once a proxy is requested.
    pub bus_address: Option<String>,

    /// Directory the proxy sockets are created in.
    pub scratch_dir: PathBuf,

    /// Where the proxied socket appears inside the sandbox.
    pub sandbox_bus_path: PathBuf,

    /// Handshake deadline; `None` waits forever.
    pub readiness_timeout: Option<Duration>,
}

impl ProxySettings {
    /// Settings for the current session.
    pub fn from_config(config: &Config, env: &SessionEnv) -> Self {
        Self {
            program: config.sandbox.dbus_proxy.clone(),
            bus_address: env.bus_address.clone(),
            scratch_dir: env.scratch_dir(),
            sandbox_bus_path: env.sandbox_bus_path(),
            readiness_timeout: config.readiness_timeout(),
        }
    }
}

/// Launches the filtering proxy and runs the readiness handshake.
#[derive(Debug, Clone)]
pub struct ProxyCoordinator {
    settings: ProxySettings,
}

impl ProxyCoordinator {
    /// Create a coordinator.
    pub fn new(settings: ProxySettings) -> Self {
        Self { settings }
    }

    /// A fresh, unguessable socket path in the scratch directory.
    pub fn socket_path(&self) -> PathBuf {
        let suffix: String = rand::thread_rng()
            .sample_iter(Uniform::new_inclusive(b'a', b'z'))
            .take(SOCKET_SUFFIX_LEN)
            .map(char::from)
            .collect();
        self.settings
            .scratch_dir
            .join(format!("{}{}", SOCKET_PREFIX, suffix))
    }
}

impl ProxyLauncher for ProxyCoordinator {
    fn launch(&self, allow_list: &[String]) -> Result<ProxyHandle> {
        let bus_address = self.settings.bus_address.as_deref().ok_or_else(|| {
            SandboxError::config(
                "a bus proxy was requested but DBUS_SESSION_BUS_ADDRESS is not set",
            )
        })?;
        let socket_path = self.socket_path();
        let socket_arg = path_arg(&socket_path)?;
        let bus_arg = path_arg(&self.settings.sandbox_bus_path)?;

        // Both ends start close-on-exec.
        let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(io::Error::from)?;
        let write_fd = write_end.as_raw_fd();

        let mut command = Command::new(&self.settings.program);
        command
            .arg(format!("--fd={}", write_fd))
            .arg(bus_address)
            .arg(&socket_arg)
            .arg("--filter")
            .args(allow_list)
            .stdin(Stdio::null());
        // SAFETY: the hook only calls fcntl, which is async-signal-safe.
        unsafe {
            command.pre_exec(move || set_inheritable(write_fd).map_err(io::Error::from));
        }

        info!(
            "Starting bus proxy {} with {} rule(s) on {}",
            self.settings.program.display(),
            allow_list.len(),
            socket_arg
        );
        let child = command.spawn().map_err(|source| SandboxError::LaunchFailed {
            program: self.settings.program.clone(),
            source,
        })?;
        // From here on only the proxy holds the write end.
        drop(write_end);

        let mut handle = ProxyHandle {
            socket_path,
            sandbox_args: Vec::new(),
            sync: Some(File::from(read_end)),
            child: Some(child),
        };
        handle.wait_ready(self.settings.readiness_timeout)?;

        let sync_fd = handle
            .sync_fd()
            .ok_or_else(|| SandboxError::protocol("readiness pipe closed"))?;
        set_inheritable(sync_fd).map_err(io::Error::from)?;
        handle.sandbox_args = vec![
            "--bind".to_string(),
            socket_arg,
            bus_arg,
            "--sync-fd".to_string(),
            sync_fd.to_string(),
        ];
        Ok(handle)
    }
}

/// A running, ready proxy.
///
/// Holds the read end of the readiness pipe, which must stay open until the
/// sandbox executor replaces this process. Dropping the handle instead stops
/// the proxy and removes its socket.
#[derive(Debug)]
pub struct ProxyHandle {
    socket_path: PathBuf,
    sandbox_args: Vec<String>,
    sync: Option<File>,
    child: Option<Child>,
}

impl ProxyHandle {
    /// Socket the proxy listens on.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Executor tokens exposing the proxy inside the sandbox.
    pub fn sandbox_args(&self) -> &[String] {
        &self.sandbox_args
    }

    /// Descriptor the executor synchronises on.
    pub fn sync_fd(&self) -> Option<RawFd> {
        self.sync.as_ref().map(AsRawFd::as_raw_fd)
    }

    #[cfg(test)]
    pub(crate) fn detached(socket_path: PathBuf, sandbox_args: Vec<String>) -> Self {
        Self {
            socket_path,
            sandbox_args,
            sync: None,
            child: None,
        }
    }

    /// Wait for one byte or end-of-file, then for the socket to exist.
    fn wait_ready(&mut self, timeout: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        let sync = self
            .sync
            .as_mut()
            .ok_or_else(|| SandboxError::protocol("readiness pipe closed"))?;
        wait_readable(sync, deadline, timeout)?;

        let mut byte = [0u8; 1];
        let read = loop {
            match sync.read(&mut byte) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SandboxError::protocol(format!(
                        "reading readiness pipe: {}",
                        e
                    )))
                }
            }
        };
        debug!(
            "Bus proxy signalled readiness ({}) after {:?}",
            if read == 0 { "closed" } else { "byte" },
            started.elapsed()
        );

        loop {
            if self.socket_path.exists() {
                return Ok(());
            }
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    // The socket may have been created just before exiting.
                    if self.socket_path.exists() {
                        return Ok(());
                    }
                    return Err(SandboxError::protocol(format!(
                        "proxy exited ({}) without creating {}",
                        status,
                        self.socket_path.display()
                    )));
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SandboxError::protocol(format!(
                    "proxy socket {} did not appear",
                    self.socket_path.display()
                )));
            }
            thread::sleep(SOCKET_POLL_INTERVAL);
        }
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        // Closing our end is the proxy's shutdown signal.
        self.sync.take();
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    warn!("Failed to stop bus proxy {}: {}", child.id(), e);
                }
            }
            let _ = child.wait();
            debug!("Stopped bus proxy {}", child.id());
        }
        if self.socket_path.exists() {
            let _ = fs::remove_file(&self.socket_path);
        }
    }
}

/// Block until `fd` is readable or hung up.
fn wait_readable(fd: &File, deadline: Option<Instant>, timeout: Option<Duration>) -> Result<()> {
    loop {
        let wait = match (deadline, timeout) {
            (Some(deadline), Some(timeout)) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(SandboxError::ProxyTimeout(timeout));
                }
                let millis = left.as_millis().clamp(1, u128::from(u16::MAX));
                PollTimeout::from(millis as u16)
            }
            _ => PollTimeout::NONE,
        };

        let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, wait) {
            Ok(0) => continue,
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e).into()),
        }
    }
}

/// Clear close-on-exec so `fd` survives the next exec.
fn set_inheritable(fd: RawFd) -> nix::Result<()> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
}
