//! Command-line surface for the `guardian` binary.
//!
//! Two subcommands share one binary: `serve` runs the long-lived HTTP proxy
//! (the scheduler's own parent process); `train` runs a single profile's
//! training pass to completion and exits, and is what the scheduler
//! re-invokes itself as via [`training::TrainerBinary`] rather than
//! something an operator runs directly.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// GuardianBridge: moderating, dialect-bridging LLM proxy.
#[derive(Debug, Parser)]
#[command(name = "guardian", version)]
pub struct Args {
    /// Log filter, e.g. "info" or "server=debug,moderation=debug".
    #[arg(long, global = true, env = "GUARDIAN_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// The subcommand to run, defaulting to [`Command::Serve`] with its own
    /// flag defaults when none was given on the command line.
    pub fn command(self) -> Command {
        self.command.unwrap_or_default()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP proxy server. The default when no subcommand is given.
    Serve(ServeArgs),
    /// Run one profile's training pass inside a dedicated subprocess, then
    /// exit with the exit-code contract documented on [`training::subprocess::run`].
    Train(TrainArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve(ServeArgs::default())
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Path to the GuardianBridge TOML configuration file.
    #[arg(long, env = "GUARDIAN_CONFIG", default_value = "guardian.toml")]
    pub config: PathBuf,

    /// Overrides `server.listen_address` from the configuration file.
    #[arg(long, env = "GUARDIAN_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from("guardian.toml"),
            listen_address: None,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct TrainArgs {
    /// Directory containing one subdirectory per moderation profile.
    #[arg(long)]
    pub profiles_root: PathBuf,
    /// Name of the profile subdirectory to train.
    #[arg(long)]
    pub profile: String,
    /// Outer wall-clock budget for the whole subprocess; a hung training
    /// pass is killed if this elapses, independent of the profile's own
    /// per-variant `max_seconds` hyperparameter.
    #[arg(long, default_value_t = 1200)]
    pub max_seconds: u64,
    /// A lock file older than this many seconds is considered abandoned.
    #[arg(long, default_value_t = 7200)]
    pub stale_lock_threshold_secs: u64,
    /// Pid of the scheduler that spawned this subprocess, used to detect
    /// (and take over) a `.train.lock` the scheduler itself left behind.
    #[arg(long)]
    pub parent_pid: u32,
    /// Single well-known file every training run on the node blocks on.
    #[arg(long)]
    pub global_lock_path: PathBuf,
}
