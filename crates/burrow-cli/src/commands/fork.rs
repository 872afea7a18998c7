//! `burrow fork` — Namespace init, re-executed by `run`.
//!
//! Assumes it is already PID 1 of the namespaces created by the launcher.

use burrow_common::config::RuntimeConfig;
use burrow_common::types::{ContainerId, ImageName};
use burrow_core::kernel::LinuxKernel;
use burrow_runtime::init::{self, InitConfig};
use clap::Args;

/// Arguments for the `fork` command.
#[derive(Args, Debug)]
pub struct ForkArgs {
    /// Run in the pivot-free, PID-namespace-only mode.
    #[arg(long)]
    pub pid_only: bool,

    /// Container id, used as the hostname.
    pub container_id: String,

    /// Image whose tree becomes the root.
    pub image: String,

    /// Command to run, followed by its arguments.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "pid_only"
    )]
    pub command: Vec<String>,
}

/// Executes the `fork` command and exits with the contained command's status.
///
/// # Errors
///
/// Returns an error if any bootstrap step fails.
pub fn execute(args: ForkArgs) -> anyhow::Result<()> {
    let exit = if args.pid_only {
        init::run_pid_only(&args.command)?
    } else {
        let config = InitConfig::new(
            ContainerId::parse(args.container_id)?,
            &ImageName::parse(args.image)?,
            args.command,
            &RuntimeConfig::from_current_dir()?,
        );
        init::run(&LinuxKernel, &config)?
    };
    std::process::exit(exit.exit_code());
}
