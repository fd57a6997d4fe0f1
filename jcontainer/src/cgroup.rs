//! Cgroup v2 resource limiting: a two-level hierarchy
//! `<root>/jcontainer/<container-id>/`, created per container and torn down
//! best-effort on close. All writes are plain `std::fs` calls against the
//! cgroupfs — nothing here needs a higher-level abstraction; the contract
//! is literally "write these bytes to these paths".

use std::fs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Default cgroup v2 mount point.
const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Handle to one container's cgroup subtree.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    /// `<root>/jcontainer`.
    parent_dir: PathBuf,
    /// `<root>/jcontainer/<container-id>`.
    container_dir: PathBuf,
}

impl CgroupManager {
    /// Binds a manager to `<root>/jcontainer/<container_id>` without
    /// touching the filesystem yet, where `<root>` is the default cgroupfs
    /// mount point.
    #[must_use]
    pub fn new(container_id: &str) -> Self {
        Self::new_at(PathBuf::from(DEFAULT_CGROUP_ROOT), container_id)
    }

    /// As [`CgroupManager::new`], rooted at an explicit cgroupfs mount
    /// point. Production code always uses the default; tests use a plain
    /// temp directory since the byte-exact write contract doesn't require a
    /// real cgroupfs to verify.
    #[must_use]
    pub fn new_at(root: PathBuf, container_id: &str) -> Self {
        let parent_dir = root.join("jcontainer");
        let container_dir = parent_dir.join(container_id);
        Self {
            parent_dir,
            container_dir,
        }
    }

    /// Creates the container's cgroup directory and enables the `cpu`/
    /// `memory` controllers on the parent's `cgroup.subtree_control`.
    /// Enabling an already-enabled controller is treated as success — the
    /// kernel itself treats a duplicate enable as idempotent, and this
    /// parent directory is shared across concurrently running containers.
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.container_dir)?;
        fs::write(self.parent_dir.join("cgroup.subtree_control"), b"+cpu +memory\n")
            .map_err(|e| Error::Cgroup(format!("enabling cpu/memory controllers: {e}")))
    }

    /// Writes `memory.max` in bytes, exactly `"<bytes>\n"`.
    pub fn set_memory_limit(&self, bytes: u64) -> Result<()> {
        fs::write(self.container_dir.join("memory.max"), format!("{bytes}\n"))
            .map_err(|e| Error::Cgroup(format!("writing memory.max: {e}")))
    }

    /// Writes `cpu.max` as `"<percent*1000> 100000\n"` (100 = one core,
    /// `period` is fixed at 100000µs). The value is not clamped.
    pub fn set_cpu_limit(&self, percent: u32) -> Result<()> {
        let quota = u64::from(percent) * 1000;
        fs::write(self.container_dir.join("cpu.max"), format!("{quota} 100000\n"))
            .map_err(|e| Error::Cgroup(format!("writing cpu.max: {e}")))
    }

    /// Appends `pid` to `cgroup.procs`, moving the process into this
    /// cgroup. Must run after the target process has been spawned.
    pub fn add_process(&self, pid: u32) -> Result<()> {
        fs::write(self.container_dir.join("cgroup.procs"), format!("{pid}\n"))
            .map_err(|e| Error::Cgroup(format!("attaching pid {pid} to cgroup: {e}")))
    }

    /// Best-effort teardown: deletes the container's cgroup directory, then
    /// the parent `jcontainer` directory if it is now empty. Both deletes
    /// are swallowed on failure — teardown is never fatal.
    pub fn close(&self) {
        let _ = fs::remove_dir(&self.container_dir);
        if fs::read_dir(&self.parent_dir).is_ok_and(|mut entries| entries.next().is_none()) {
            let _ = fs::remove_dir(&self.parent_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "jcontainer-cgroup-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn memory_limit_is_byte_exact() {
        let root = temp_root("mem");
        let mgr = CgroupManager::new_at(root, "abc123");
        mgr.create().unwrap();
        mgr.set_memory_limit(100 * 1024 * 1024).unwrap();
        let written = fs::read_to_string(mgr.container_dir.join("memory.max")).unwrap();
        assert_eq!(written, "104857600\n");
    }

    #[test]
    fn cpu_limit_encoding_is_byte_exact() {
        let root = temp_root("cpu");
        let mgr = CgroupManager::new_at(root, "abc123");
        mgr.create().unwrap();
        mgr.set_cpu_limit(50).unwrap();
        let written = fs::read_to_string(mgr.container_dir.join("cpu.max")).unwrap();
        assert_eq!(written, "50000 100000\n");

        mgr.set_cpu_limit(200).unwrap();
        let written = fs::read_to_string(mgr.container_dir.join("cpu.max")).unwrap();
        assert_eq!(written, "200000 100000\n");
    }

    #[test]
    fn add_process_appends_pid() {
        let root = temp_root("procs");
        let mgr = CgroupManager::new_at(root, "abc123");
        mgr.create().unwrap();
        mgr.add_process(4242).unwrap();
        let written = fs::read_to_string(mgr.container_dir.join("cgroup.procs")).unwrap();
        assert_eq!(written, "4242\n");
    }

    #[test]
    fn close_removes_parent_when_empty_but_not_when_shared() {
        let root = temp_root("teardown");
        let solo = CgroupManager::new_at(root.clone(), "onlyone");
        solo.create().unwrap();
        solo.close();
        assert!(!solo.container_dir.exists());
        assert!(!root.join("jcontainer").exists());

        let root2 = temp_root("teardown-shared");
        let a = CgroupManager::new_at(root2.clone(), "a");
        let b = CgroupManager::new_at(root2.clone(), "b");
        a.create().unwrap();
        b.create().unwrap();
        a.close();
        assert!(!a.container_dir.exists());
        assert!(root2.join("jcontainer").exists(), "parent stays while b is still present");
        b.close();
        assert!(!root2.join("jcontainer").exists());
    }
}
