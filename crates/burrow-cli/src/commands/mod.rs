//! CLI command definitions and dispatch.

pub mod fork;
pub mod import;
pub mod run;

use clap::{Parser, Subcommand};

/// Burrow — run a command in its own namespaces and root filesystem.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside a new container: `burrow run <image> <command> [args...]`.
    Run(run::RunArgs),
    /// Namespace init entry point used by `run`; not for direct use.
    #[command(hide = true)]
    Fork(fork::ForkArgs),
    /// Provision `<home>/rootfs/<image>` from an exported image archive.
    Import(import::ImportArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    tracing::debug!(command = ?cli.command, "dispatching");
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Fork(args) => fork::execute(args),
        Command::Import(args) => import::execute(args),
    }
}
