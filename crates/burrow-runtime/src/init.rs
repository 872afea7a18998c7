//! The namespace init (`fork` stage).
//!
//! Runs as the first process inside the namespaces created by the launcher
//! and walks the [`InitStage`] sequence:
//!
//! 1. set the hostname to the container id;
//! 2. create the old-root parking directory (fails fast if the root is missing);
//! 3. remark the mount tree private;
//! 4. bind-mount the new root onto itself;
//! 5. mount `proc`, and tmpfs on `dev` and `tmp`, under the new root;
//! 6. `pivot_root` into the new root;
//! 7. detach and remove the old root;
//! 8. run the command, then release the mounts in reverse order.
//!
//! Each step is fatal on failure. Mounts made so far are released on every
//! exit path, and a parking directory created by this run is removed if the
//! pivot never happened. Anything else is left for the operator.

use std::path::{Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::constants::PUT_OLD_DIR;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ChildExit, ContainerId, ImageName, InitStage};
use burrow_core::filesystem::mount::{MountSpec, MountStack, Unmount};
use burrow_core::filesystem::pivot_root::prepare_put_old;
use burrow_core::kernel::Kernel;

use crate::process;

/// Everything the namespace init needs, resolved before the first syscall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    /// Label used as the hostname.
    pub container_id: ContainerId,
    /// Host path of the provisioned root filesystem.
    pub new_root: PathBuf,
    /// Host path of the old-root parking directory, inside `new_root`.
    pub put_old: PathBuf,
    /// Command and arguments to run once confined.
    pub command: Vec<String>,
    /// tmpfs options for `/dev`.
    pub dev_tmpfs_options: String,
    /// tmpfs options for `/tmp`.
    pub tmp_tmpfs_options: String,
}

impl InitConfig {
    /// Resolves the configuration for `image` under `runtime`.
    #[must_use]
    pub fn new(
        container_id: ContainerId,
        image: &ImageName,
        command: Vec<String>,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self {
            container_id,
            new_root: runtime.new_root(image),
            put_old: runtime.put_old(image),
            command,
            dev_tmpfs_options: runtime.dev_tmpfs_options.clone(),
            tmp_tmpfs_options: runtime.tmp_tmpfs_options.clone(),
        }
    }

    /// The auxiliary mounts, as host paths under the new root.
    #[must_use]
    pub fn aux_mounts(&self) -> [MountSpec; 3] {
        [
            MountSpec::proc(self.new_root.join("proc")),
            MountSpec::tmpfs(self.new_root.join("dev"), &self.dev_tmpfs_options),
            MountSpec::tmpfs(self.new_root.join("tmp"), &self.tmp_tmpfs_options),
        ]
    }
}

fn at(stage: InitStage) -> impl FnOnce(BurrowError) -> BurrowError {
    move |e| e.at_stage(stage)
}

fn reached(stage: InitStage) {
    tracing::debug!(%stage, "init stage reached");
}

/// Working directory inside the new root, held between `chdir` and the pivot.
///
/// A directory under a mount pins it, so if the pivot fails the working
/// directory is moved back to `/` before the mounts are released.
struct EnteredRoot<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
    armed: bool,
}

impl<'k, K: Kernel + ?Sized> EnteredRoot<'k, K> {
    fn enter(kernel: &'k K, new_root: &Path) -> Result<Self> {
        kernel.chdir(new_root)?;
        Ok(Self {
            kernel,
            armed: true,
        })
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<K: Kernel + ?Sized> Drop for EnteredRoot<'_, K> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.kernel.chdir(Path::new("/")) {
                tracing::warn!(error = %e, "failed to leave new root");
            }
        }
    }
}

/// Confines this process to the new root and runs the command in it.
///
/// Returns how the command terminated; its status becomes this process's
/// exit status.
///
/// # Errors
///
/// Returns [`BurrowError::Bootstrap`] naming the stage that could not be
/// reached.
pub fn run<K: Kernel + ?Sized>(kernel: &K, config: &InitConfig) -> Result<ChildExit> {
    tracing::info!(pid = std::process::id(), id = %config.container_id, "[fork] namespace init");
    reached(InitStage::Created);

    kernel
        .set_hostname(config.container_id.as_str())
        .map_err(at(InitStage::HostnameSet))?;
    reached(InitStage::HostnameSet);

    let mut parking =
        prepare_put_old(&config.new_root, &config.put_old).map_err(at(InitStage::RootPrepared))?;
    reached(InitStage::RootPrepared);

    kernel
        .make_mounts_private()
        .map_err(at(InitStage::PropagationIsolated))?;
    reached(InitStage::PropagationIsolated);

    let mut mounts = MountStack::new(kernel);
    mounts
        .mount(&MountSpec::bind_self(&config.new_root))
        .map_err(at(InitStage::SelfBound))?;
    reached(InitStage::SelfBound);

    for spec in config.aux_mounts() {
        ensure_mount_point(&spec.target).map_err(at(InitStage::MountsReady))?;
        mounts.mount(&spec).map_err(at(InitStage::MountsReady))?;
    }
    reached(InitStage::MountsReady);

    // Dropped before `mounts`, so a failed pivot leaves the root first.
    let mut entered =
        EnteredRoot::enter(kernel, &config.new_root).map_err(at(InitStage::Pivoted))?;
    kernel
        .pivot_root(&config.new_root, parking.path())
        .map_err(at(InitStage::Pivoted))?;
    entered.disarm();
    parking.disarm();
    mounts.rebase(&config.new_root);
    tracing::info!(root = %config.new_root.display(), "pivoted into new root");
    reached(InitStage::Pivoted);

    detach_old_root(kernel).map_err(at(InitStage::OldRootDetached))?;
    reached(InitStage::OldRootDetached);

    reached(InitStage::Executing);
    let exit = process::run_command(&config.command).map_err(at(InitStage::Executing))?;
    tracing::info!(%exit, "contained command finished");

    mounts.release();
    reached(InitStage::Exited);
    Ok(exit)
}

fn detach_old_root<K: Kernel + ?Sized>(kernel: &K) -> Result<()> {
    let parked = Path::new("/").join(PUT_OLD_DIR);
    kernel.chdir(Path::new("/"))?;
    kernel.unmount(&parked, Unmount::Detach)?;
    kernel.remove_dir_all(&parked)?;
    if parked.exists() {
        return Err(BurrowError::Config {
            message: format!("{} still present after detach", parked.display()),
        });
    }
    tracing::debug!("old root detached");
    Ok(())
}

fn ensure_mount_point(target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| BurrowError::Io {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Degraded, pivot-free mode: the process only has its own PID namespace.
///
/// Runs `command` directly with no filesystem confinement. With no command,
/// blocks until SIGINT or SIGTERM and reports a clean exit.
///
/// # Errors
///
/// Returns an error if the command cannot be started or signals cannot be
/// waited for.
pub fn run_pid_only(command: &[String]) -> Result<ChildExit> {
    tracing::info!(pid = std::process::id(), "[fork] pid-only init");
    if command.is_empty() {
        let _signal = process::wait_for_termination()?;
        return Ok(ChildExit::Code(0));
    }
    process::run_command(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::testing::RecordingKernel;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: InitConfig,
    }

    fn fixture(command: &[&str], provision: bool) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = RuntimeConfig::for_working_dir(dir.path());
        let image = ImageName::parse("busybox-test").unwrap();
        if provision {
            std::fs::create_dir_all(runtime.new_root(&image)).expect("mkdir rootfs");
        }
        let config = InitConfig::new(
            ContainerId::parse("abc123def456").unwrap(),
            &image,
            command.iter().map(|s| (*s).to_owned()).collect(),
            &runtime,
        );
        Fixture { _dir: dir, config }
    }

    fn root(config: &InitConfig) -> String {
        config.new_root.display().to_string()
    }

    #[test]
    fn full_sequence_runs_in_order_and_unwinds_in_reverse() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::new();

        let exit = run(&kernel, &fx.config).expect("init");
        assert_eq!(exit, ChildExit::Code(0));

        let r = root(&fx.config);
        assert_eq!(
            kernel.calls(),
            vec![
                "sethostname abc123def456".to_owned(),
                "make_private /".to_owned(),
                format!("mount bind {r} {r}"),
                format!("mount proc {r}/proc"),
                format!("mount tmpfs {r}/dev"),
                format!("mount tmpfs {r}/tmp"),
                format!("chdir {r}"),
                format!("pivot_root {r} {r}/.put_old"),
                "chdir /".to_owned(),
                "unmount /.put_old detach".to_owned(),
                "remove_dir_all /.put_old".to_owned(),
                "unmount /tmp".to_owned(),
                "unmount /dev".to_owned(),
                "unmount /proc".to_owned(),
            ]
        );
    }

    #[test]
    fn missing_root_fails_before_any_mount() {
        let fx = fixture(&["true"], false);
        let kernel = RecordingKernel::new();

        let err = run(&kernel, &fx.config).unwrap_err();
        assert!(
            matches!(
                &err,
                BurrowError::Bootstrap { stage: InitStage::RootPrepared, source }
                    if matches!(**source, BurrowError::NotFound { .. })
            ),
            "{err}"
        );
        assert_eq!(kernel.calls(), vec!["sethostname abc123def456"]);
        assert!(!fx.config.new_root.exists());
    }

    #[test]
    fn hostname_failure_stops_before_touching_the_root() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::failing_on("sethostname");

        let err = run(&kernel, &fx.config).unwrap_err();
        assert!(
            matches!(err, BurrowError::Bootstrap { stage: InitStage::HostnameSet, .. }),
            "{err}"
        );
        assert!(!fx.config.put_old.exists());
    }

    #[test]
    fn failed_pivot_releases_mounts_and_parking_directory() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::failing_on("pivot_root");

        let err = run(&kernel, &fx.config).unwrap_err();
        assert!(
            matches!(err, BurrowError::Bootstrap { stage: InitStage::Pivoted, .. }),
            "{err}"
        );

        let r = root(&fx.config);
        let calls = kernel.calls();
        let pivot = calls.iter().position(|c| c.starts_with("pivot_root")).unwrap();
        assert_eq!(
            calls[pivot + 1..],
            [
                "chdir /".to_owned(),
                format!("unmount {r}/tmp"),
                format!("unmount {r}/dev"),
                format!("unmount {r}/proc"),
                format!("unmount {r}"),
            ]
        );
        assert!(!fx.config.put_old.exists());
    }

    #[test]
    fn working_directory_leaves_the_root_before_the_self_bind_is_released() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::failing_on("pivot_root");

        let _err = run(&kernel, &fx.config).unwrap_err();

        let r = root(&fx.config);
        let calls = kernel.calls();
        let last_chdir = calls.iter().rposition(|c| c.starts_with("chdir")).unwrap();
        let root_unmount = calls.iter().position(|c| *c == format!("unmount {r}")).unwrap();
        assert_eq!(calls[last_chdir], "chdir /");
        assert!(last_chdir < root_unmount, "{calls:#?}");
    }

    #[test]
    fn successful_pivot_does_not_restore_the_working_directory() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::new();

        let _exit = run(&kernel, &fx.config).expect("init");
        assert_eq!(kernel.calls_to("chdir").len(), 2);
    }

    #[test]
    fn parking_directory_comes_from_runtime_config() {
        let fx = fixture(&["true"], true);
        assert_eq!(fx.config.put_old, fx.config.new_root.join(".put_old"));
    }

    #[test]
    fn failed_propagation_change_mounts_nothing() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::failing_on("make_private");

        let err = run(&kernel, &fx.config).unwrap_err();
        assert!(
            matches!(err, BurrowError::Bootstrap { stage: InitStage::PropagationIsolated, .. }),
            "{err}"
        );
        assert!(kernel.calls_to("mount").is_empty());
        assert!(!fx.config.put_old.exists());
    }

    #[test]
    fn command_failure_is_propagated_after_teardown() {
        let fx = fixture(&["sh", "-c", "exit 7"], true);
        let kernel = RecordingKernel::new();

        let exit = run(&kernel, &fx.config).expect("init");
        assert_eq!(exit, ChildExit::Code(7));
        assert_eq!(
            kernel.calls_to("unmount"),
            vec!["unmount /.put_old detach", "unmount /tmp", "unmount /dev", "unmount /proc"]
        );
    }

    #[test]
    fn unstartable_command_still_unwinds_mounts() {
        let fx = fixture(&["/nonexistent/burrow-test-binary"], true);
        let kernel = RecordingKernel::new();

        let err = run(&kernel, &fx.config).unwrap_err();
        assert!(
            matches!(err, BurrowError::Bootstrap { stage: InitStage::Executing, .. }),
            "{err}"
        );
        assert_eq!(kernel.calls().last().map(String::as_str), Some("unmount /proc"));
    }

    #[test]
    fn aux_mount_points_are_created_under_the_new_root() {
        let fx = fixture(&["true"], true);
        let kernel = RecordingKernel::new();

        let _exit = run(&kernel, &fx.config).expect("init");
        for dir in ["proc", "dev", "tmp"] {
            assert!(fx.config.new_root.join(dir).is_dir(), "{dir}");
        }
    }

    #[test]
    fn pid_only_mode_runs_command_directly() {
        let exit = run_pid_only(&["sh".into(), "-c".into(), "exit 4".into()]).unwrap();
        assert_eq!(exit, ChildExit::Code(4));
    }
}
