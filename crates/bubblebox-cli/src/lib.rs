//! bubblebox command-line interface.

use anyhow::Context;
use bubblebox_core::{paths, Config, SessionEnv};
use bubblebox_sandbox::{shared_runtime_dir, Directive, Launcher, ProfileResolver, SandboxError};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// bubblebox - run a program inside a bubblewrap sandbox
#[derive(Debug, Parser)]
#[command(name = "bubblebox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "BUBBLEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sandbox profile to use (defaults to the configured default profile)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Print the sandbox command line instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Share one runtime dir between all boxes started with this name
    #[arg(long, value_name = "NAME")]
    pub share: Option<String>,

    /// Program to run, followed by its arguments
    #[arg(
        value_name = "PROGRAM",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Log filter for the given number of `-v` flags.
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "bubblebox=warn",
        1 => "bubblebox=info",
        2 => "bubblebox=debug",
        _ => "bubblebox=trace",
    }
}

/// Exit status for an error that ended the run.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SandboxError>() {
        Some(e) => u8::try_from(e.exit_code()).unwrap_or(1),
        None => 1,
    }
}

/// Run the CLI with the given arguments.
///
/// Only returns on a dry run or when something went wrong; otherwise the
/// process becomes the sandbox.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    let env = SessionEnv::from_env()?;
    paths::ensure_scratch_dir(&env.runtime_dir)?;

    let profile = cli.profile.as_deref().unwrap_or(config.default_profile.as_str());
    info!("Using profile '{}'", profile);

    let resolver = ProfileResolver::new(&config, &env);
    let mut tree = vec![resolver.resolve(profile)?];
    if let Some(name) = &cli.share {
        tree.push(shared_runtime_dir(&env, name)?);
    }

    let launcher = Launcher::from_config(&config, &env);
    let plan = launcher.prepare(&Directive::group(tree), &cli.command)?;

    if cli.dry_run {
        println!("{}", plan.command_line());
        return Ok(());
    }
    Err(plan.exec().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_program_with_hyphen_args() {
        let cli =
            Cli::try_parse_from(["bubblebox", "-p", "desktop", "ls", "-la", "--color"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("desktop"));
        assert_eq!(cli.command, ["ls", "-la", "--color"]);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_flags_after_program_belong_to_program() {
        let cli = Cli::try_parse_from(["bubblebox", "--dry-run", "bash", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.command, ["bash", "--dry-run"]);
    }

    #[test]
    fn test_parse_options() {
        let cli = Cli::try_parse_from([
            "bubblebox", "-vv", "--config", "/tmp/bb.json5", "--share", "firefox", "firefox",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bb.json5")));
        assert_eq!(cli.share.as_deref(), Some("firefox"));
        assert_eq!(cli.command, ["firefox"]);
    }

    #[test]
    fn test_program_required() {
        let err = Cli::try_parse_from(["bubblebox", "-p", "desktop"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(0), "bubblebox=warn");
        assert_eq!(log_filter(2), "bubblebox=debug");
        assert_eq!(log_filter(9), "bubblebox=trace");
    }

    #[test]
    fn test_exit_code() {
        let missing: anyhow::Error = SandboxError::LaunchFailed {
            program: PathBuf::from("/usr/bin/bwrap"),
            source: io::Error::from(io::ErrorKind::NotFound),
        }
        .into();
        assert_eq!(exit_code(&missing), 127);

        let denied = anyhow::Error::from(SandboxError::LaunchFailed {
            program: PathBuf::from("/usr/bin/bwrap"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        })
        .context("launching");
        assert_eq!(exit_code(&denied), 126);

        assert_eq!(exit_code(&anyhow::anyhow!("bad config")), 1);
    }
}
