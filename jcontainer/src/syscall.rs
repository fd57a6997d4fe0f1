//! Thin, typed wrapper around the raw syscalls the isolation pipeline needs.
//!
//! Every function here returns the caller's `Result`; success is `Ok(())`,
//! failure carries the OS `errno`. On non-Linux hosts only [`chroot`] and
//! [`chdir`] are available — the namespace-related calls return
//! [`Error::Unsupported`].

use std::path::Path;

use nix::Result as NixResult;

/// `mount(2)`'s `MS_BIND` flag: bind-mount an existing path elsewhere.
pub const MS_BIND: u64 = 4096;
/// `mount(2)`'s `MS_REC` flag: apply recursively to submounts.
pub const MS_REC: u64 = 16384;
/// `mount(2)`'s `MS_PRIVATE` flag: stop mount/unmount propagation.
pub const MS_PRIVATE: u64 = 1 << 18;
/// `umount2(2)`'s `MNT_DETACH` flag: lazy unmount.
pub const MNT_DETACH: i32 = 2;
/// `clone(2)`/`unshare(2)` flag: new mount namespace.
pub const CLONE_NEWNS: u64 = 0x0002_0000;
/// `clone(2)`/`unshare(2)` flag: new UTS (hostname) namespace.
pub const CLONE_NEWUTS: u64 = 0x0400_0000;
/// `clone(2)`/`unshare(2)` flag: new PID namespace.
pub const CLONE_NEWPID: u64 = 0x2000_0000;
/// `clone(2)`/`unshare(2)` flag: new network namespace.
pub const CLONE_NEWNET: u64 = 0x4000_0000;

/// Error raised when a namespace-related syscall is invoked on a platform
/// that does not support it (anything but Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported;

impl std::fmt::Display for Unsupported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unsupported on this platform")
    }
}

impl std::error::Error for Unsupported {}

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    use nix::Result;
    use nix::mount::{MntFlags, MsFlags};
    use nix::sched::CloneFlags;

    /// Detaches the calling process from shared copies of the listed
    /// namespaces; only subsequently created children are placed into the
    /// fresh namespaces (the caller itself never moves).
    pub fn unshare(flags: u64) -> Result<()> {
        nix::sched::unshare(CloneFlags::from_bits_truncate(
            i32::try_from(flags).unwrap_or(i32::MAX),
        ))
    }

    /// Wraps `mount(2)`.
    pub fn mount(
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: u64,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(
            source,
            target,
            fstype,
            MsFlags::from_bits_truncate(i32::try_from(flags).unwrap_or(i32::MAX) as _),
            data,
        )
    }

    /// Wraps `umount2(2)`.
    pub fn umount2(target: &Path, flags: i32) -> Result<()> {
        nix::mount::umount2(target, MntFlags::from_bits_truncate(flags))
    }

    /// `pivot_root(2)` has no libc wrapper; nix doesn't expose it either.
    /// Invoked through the generic `syscall()` trampoline with an
    /// architecture-selected syscall number.
    pub fn pivot_root(new_root: &Path, put_old: &Path) -> Result<()> {
        #[cfg(target_arch = "x86_64")]
        const SYS_PIVOT_ROOT: i64 = 155;
        #[cfg(target_arch = "aarch64")]
        const SYS_PIVOT_ROOT: i64 = 217;
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        const SYS_PIVOT_ROOT: i64 = -1;

        if SYS_PIVOT_ROOT < 0 {
            return Err(nix::Error::ENOSYS);
        }

        let new_root = CString::new(new_root.as_os_str().as_bytes()).map_err(|_| nix::Error::EINVAL)?;
        let put_old = CString::new(put_old.as_os_str().as_bytes()).map_err(|_| nix::Error::EINVAL)?;
        // SAFETY: both paths are valid, NUL-terminated C strings; the
        // syscall number is fixed per architecture.
        let ret = unsafe { libc::syscall(SYS_PIVOT_ROOT, new_root.as_ptr(), put_old.as_ptr()) };
        if ret == 0 {
            Ok(())
        } else {
            Err(nix::Error::last())
        }
    }

    /// Wraps `sethostname(2)`.
    pub fn sethostname(name: &str) -> Result<()> {
        nix::unistd::sethostname(name)
    }
}

/// Detaches the calling process from shared copies of the listed namespaces.
/// Only subsequently created children are placed into the fresh namespaces.
#[cfg(target_os = "linux")]
pub fn unshare(flags: u64) -> NixResult<()> {
    linux::unshare(flags)
}

/// Stub for non-Linux hosts: namespace isolation is unavailable there.
#[cfg(not(target_os = "linux"))]
pub fn unshare(_flags: u64) -> Result<(), Unsupported> {
    Err(Unsupported)
}

/// Performs a `mount(2)` call.
#[cfg(target_os = "linux")]
pub fn mount(
    source: Option<&Path>,
    target: &Path,
    fstype: Option<&str>,
    flags: u64,
    data: Option<&str>,
) -> NixResult<()> {
    linux::mount(source, target, fstype, flags, data)
}

/// Stub for non-Linux hosts.
#[cfg(not(target_os = "linux"))]
pub fn mount(
    _source: Option<&Path>,
    _target: &Path,
    _fstype: Option<&str>,
    _flags: u64,
    _data: Option<&str>,
) -> Result<(), Unsupported> {
    Err(Unsupported)
}

/// Performs a `umount2(2)` call.
#[cfg(target_os = "linux")]
pub fn umount2(target: &Path, flags: i32) -> NixResult<()> {
    linux::umount2(target, flags)
}

/// Stub for non-Linux hosts.
#[cfg(not(target_os = "linux"))]
pub fn umount2(_target: &Path, _flags: i32) -> Result<(), Unsupported> {
    Err(Unsupported)
}

/// Performs a `pivot_root(2)` call via the raw `syscall()` trampoline.
#[cfg(target_os = "linux")]
pub fn pivot_root(new_root: &Path, put_old: &Path) -> NixResult<()> {
    linux::pivot_root(new_root, put_old)
}

/// Stub for non-Linux hosts.
#[cfg(not(target_os = "linux"))]
pub fn pivot_root(_new_root: &Path, _put_old: &Path) -> Result<(), Unsupported> {
    Err(Unsupported)
}

/// Sets the UTS (hostname) namespace's hostname.
#[cfg(target_os = "linux")]
pub fn sethostname(name: &str) -> NixResult<()> {
    linux::sethostname(name)
}

/// Stub for non-Linux hosts.
#[cfg(not(target_os = "linux"))]
pub fn sethostname(_name: &str) -> Result<(), Unsupported> {
    Err(Unsupported)
}

/// Changes the process's root directory. Available on every Unix host.
pub fn chroot(path: &Path) -> NixResult<()> {
    nix::unistd::chroot(path)
}

/// Changes the process's current working directory. Available on every
/// Unix host.
pub fn chdir(path: &Path) -> NixResult<()> {
    nix::unistd::chdir(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_bit_exact() {
        assert_eq!(MS_BIND, 4096);
        assert_eq!(MS_REC, 16384);
        assert_eq!(MS_PRIVATE, 1 << 18);
        assert_eq!(MNT_DETACH, 2);
        assert_eq!(CLONE_NEWNS, 0x0002_0000);
        assert_eq!(CLONE_NEWUTS, 0x0400_0000);
        assert_eq!(CLONE_NEWPID, 0x2000_0000);
        assert_eq!(CLONE_NEWNET, 0x4000_0000);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn constants_match_nix_flag_bits() {
        use nix::mount::MsFlags;
        use nix::sched::CloneFlags;
        assert_eq!(MS_BIND as i32, MsFlags::MS_BIND.bits());
        assert_eq!(MS_REC as i32, MsFlags::MS_REC.bits());
        assert_eq!(MS_PRIVATE as i32, MsFlags::MS_PRIVATE.bits());
        assert_eq!(CLONE_NEWNS as i32, CloneFlags::CLONE_NEWNS.bits());
        assert_eq!(CLONE_NEWUTS as i32, CloneFlags::CLONE_NEWUTS.bits());
        assert_eq!(CLONE_NEWPID as i32, CloneFlags::CLONE_NEWPID.bits());
        assert_eq!(CLONE_NEWNET as i32, CloneFlags::CLONE_NEWNET.bits());
    }
}
