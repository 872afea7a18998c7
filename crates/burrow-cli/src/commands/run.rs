//! `burrow run` — Launch a command inside a new container.

use anyhow::Context;
use burrow_common::config::RuntimeConfig;
use burrow_common::types::ImageName;
use burrow_runtime::launcher::{IsolationMode, LaunchConfig, launch};
use clap::Args;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only create a PID namespace; no user mapping and no pivot.
    #[arg(long)]
    pub pid_only: bool,

    /// Image whose tree under `./rootfs/<image>` becomes the root.
    pub image: String,

    /// Command to run, followed by its arguments.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "pid_only"
    )]
    pub command: Vec<String>,
}

/// Executes the `run` command.
///
/// Exits the process with the container's status: the command's own exit
/// code, or `128 + signo` if it was killed.
///
/// # Errors
///
/// Returns an error if the image name is invalid or the container cannot
/// be started.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = LaunchConfig {
        image: ImageName::parse(args.image)?,
        command: args.command,
        mode: if args.pid_only {
            IsolationMode::PidOnly
        } else {
            IsolationMode::Full
        },
        runtime: RuntimeConfig::from_current_dir()?,
    };

    let exit = launch(&config).context("failed to start container")?;
    std::process::exit(exit.exit_code());
}
