//! The launcher (`run` stage).
//!
//! Generates a container id, re-executes this binary as `fork` inside new
//! namespaces with a UID/GID mapping, and blocks until that child exits.
//! Nothing is retried.

use std::path::Path;

use burrow_common::config::RuntimeConfig;
use burrow_common::constants::{BIN_NAME, FORK_SUBCOMMAND, PID_ONLY_FLAG, SELF_EXE};
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ChildExit, ContainerId, ImageName, NamespaceSet};
use burrow_core::namespace::{spawn_in_namespaces, user};

/// How much isolation the container gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// All namespaces, UID/GID mapping, and a pivot into the provisioned root.
    #[default]
    Full,
    /// PID namespace only; no mapping, no hostname, no filesystem confinement.
    PidOnly,
}

impl IsolationMode {
    /// Namespaces created for this mode.
    #[must_use]
    pub const fn namespaces(self) -> NamespaceSet {
        match self {
            Self::Full => NamespaceSet::full(),
            Self::PidOnly => NamespaceSet::pid_only(),
        }
    }
}

/// A parsed `run` invocation.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Image whose provisioned tree becomes the root.
    pub image: ImageName,
    /// Command and arguments to run inside the container.
    pub command: Vec<String>,
    /// Isolation mode.
    pub mode: IsolationMode,
    /// Paths shared with the namespace init.
    pub runtime: RuntimeConfig,
}

/// Argument vector for the `fork` re-execution.
#[must_use]
pub fn fork_argv(id: &ContainerId, config: &LaunchConfig) -> Vec<String> {
    let mut argv = vec![BIN_NAME.to_owned(), FORK_SUBCOMMAND.to_owned()];
    if config.mode == IsolationMode::PidOnly {
        argv.push(PID_ONLY_FLAG.to_owned());
    }
    argv.push(id.to_string());
    argv.push(config.image.to_string());
    argv.extend(config.command.iter().cloned());
    argv
}

/// Checks that the provisioned root exists before any namespace is made.
fn check_root(config: &LaunchConfig) -> Result<()> {
    if config.mode == IsolationMode::PidOnly {
        return Ok(());
    }
    let new_root = config.runtime.new_root(&config.image);
    match std::fs::metadata(&new_root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(BurrowError::Config {
            message: format!("root filesystem {} is not a directory", new_root.display()),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BurrowError::NotFound {
            kind: "root filesystem",
            id: new_root.display().to_string(),
        }),
        Err(e) => Err(BurrowError::Io {
            path: new_root,
            source: e,
        }),
    }
}

/// Starts the container and waits for it.
///
/// # Errors
///
/// Returns an error if the root filesystem is missing, if the namespaces
/// cannot be created, or if the child cannot be waited for. A failing
/// command is not an error here; it is reported through the returned
/// [`ChildExit`].
pub fn launch(config: &LaunchConfig) -> Result<ChildExit> {
    tracing::info!(pid = std::process::id(), image = %config.image, "[run] launcher");
    if config.mode == IsolationMode::Full && config.command.is_empty() {
        return Err(BurrowError::Config {
            message: "a command is required".into(),
        });
    }
    check_root(config)?;

    let id = ContainerId::generate();
    let argv = fork_argv(&id, config);
    let id_maps = config.mode.namespaces().user.then(user::invoking_user_maps);

    let child = spawn_in_namespaces(
        Path::new(SELF_EXE),
        &argv,
        config.mode.namespaces(),
        id_maps.as_ref(),
    )?;
    tracing::info!(id = %id, pid = %child.pid(), "container started");

    let exit = child.wait()?;
    report_exit(&id, exit);
    Ok(exit)
}

/// A failing command is the container's business, not a launcher error.
fn report_exit(id: &ContainerId, exit: ChildExit) {
    tracing::info!(id = %id, %exit, "container exited");
}
