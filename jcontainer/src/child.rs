//! The Child Initializer: runs inside the new namespaces (or,
//! in degraded mode, the same process that was re-exec'd), finalizes the
//! filesystem, sets the hostname, and execs the target command. Any
//! failure here is fatal — the parent observes it as this process's
//! nonzero exit code, never a crash it needs to interpret specially.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use crate::platform::Platform;
use crate::syscall;
use crate::{Error, Result};

/// Finalizes the container's filesystem and hostname, then execs `command`.
/// Never returns on success — the process image is replaced in place.
pub fn init(platform: Platform, rootfs: &Path, command: &[String]) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(Error::Config("no command given to exec inside the container".to_owned()));
    };

    match platform {
        Platform::Linux => {
            syscall::sethostname("container")
                .map_err(|e| Error::Syscall(format!("sethostname: {e}")))?;
            setup_filesystem_linux(rootfs)?;
        }
        Platform::Degraded => setup_filesystem_degraded(rootfs)?,
    }

    let err = Command::new(program).args(args).exec();
    Err(Error::Syscall(format!("exec {program}: {err}")))
}

/// `mount --make-rprivate /`; bind-mount `rootfs` onto itself so
/// `pivot_root` has a true mount point distinct from `/`; `pivot_root`;
/// `chdir("/")`; mount a fresh `/proc`; lazily unmount and delete the old
/// root.
fn setup_filesystem_linux(rootfs: &Path) -> Result<()> {
    syscall::mount(None, Path::new("/"), None, syscall::MS_REC | syscall::MS_PRIVATE, None)
        .map_err(|e| Error::Syscall(format!("mount --make-rprivate /: {e}")))?;
    syscall::mount(Some(rootfs), rootfs, None, syscall::MS_BIND, None)
        .map_err(|e| Error::Syscall(format!("bind-mounting rootfs onto itself: {e}")))?;

    let old_root = rootfs.join("oldrootfs");
    std::fs::create_dir_all(&old_root)?;
    syscall::pivot_root(rootfs, &old_root).map_err(|e| Error::Syscall(format!("pivot_root: {e}")))?;
    syscall::chdir(Path::new("/")).map_err(|e| Error::Syscall(format!("chdir /: {e}")))?;

    let proc_dir = Path::new("/proc");
    std::fs::create_dir_all(proc_dir)?;
    syscall::mount(Some(Path::new("proc")), proc_dir, Some("proc"), 0, None)
        .map_err(|e| Error::Syscall(format!("mount /proc: {e}")))?;

    syscall::umount2(Path::new("/oldrootfs"), syscall::MNT_DETACH)
        .map_err(|e| Error::Syscall(format!("umount2 /oldrootfs: {e}")))?;
    let _ = std::fs::remove_dir_all("/oldrootfs");

    Ok(())
}

/// `chroot(rootfs)` then `chdir("/")` — the degraded-mode equivalent for
/// non-Linux development hosts, which lack namespaces entirely.
fn setup_filesystem_degraded(rootfs: &Path) -> Result<()> {
    syscall::chroot(rootfs).map_err(|e| Error::Syscall(format!("chroot: {e}")))?;
    syscall::chdir(Path::new("/")).map_err(|e| Error::Syscall(format!("chdir /: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_a_config_error() {
        let result = init(Platform::Degraded, Path::new("/tmp"), &[]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
