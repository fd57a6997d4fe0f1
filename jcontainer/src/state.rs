//! Persistent container lifecycle state: the Container Registry. One
//! directory per container under
//! `$HOME/.jcontainer/containers/<id>/`: `metadata.json` (the
//! `ContainerState`, pretty-printed) plus `stdout.log`/`stderr.log` written
//! by the Parent Driver and read by the Lifecycle Controller. Ownership is
//! exclusive to the registry on disk — concurrent writers to the same id
//! are a caller contract, not locked here.

use std::fs;
use std::path::PathBuf;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::config::containers_root;
use crate::{Error, Result};

/// Lifecycle status of a container, as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The container's process is believed to still be alive.
    Running,
    /// The process terminated (observed directly, or reconciled from a
    /// dead PID on read).
    Exited,
    /// The process was stopped via an explicit `stop` command.
    Stopped,
}

/// Persistent per-container record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerState {
    /// 8 hex-character random identifier.
    pub id: String,
    /// Host PID of the container's top-level (child initializer) process.
    pub pid: u32,
    /// ISO-8601 UTC timestamp recorded at launch.
    #[serde(rename = "startTime")]
    pub start_time: String,
    /// Absolute rootfs path used for this container.
    pub rootfs: String,
    /// Image reference string, if launched via `--image`.
    pub image: Option<String>,
    /// Command and arguments exec'd inside the container.
    pub command: Vec<String>,
    /// Current lifecycle status.
    pub status: Status,
    /// Exit code, known only once the container has exited normally.
    #[serde(rename = "exitCode")]
    pub exit_code: Option<i32>,
}

/// On-disk container registry rooted at `$HOME/.jcontainer/containers`.
#[derive(Debug, Clone)]
pub struct Registry {
    base: PathBuf,
}

impl Registry {
    /// Opens the registry at the default location.
    #[must_use]
    pub fn open() -> Self {
        Self::open_at(containers_root())
    }

    /// Opens the registry rooted at an explicit directory.
    #[must_use]
    pub fn open_at(base: PathBuf) -> Self {
        Self { base }
    }

    fn container_dir(&self, id: &str) -> PathBuf {
        self.base.join(id)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join("metadata.json")
    }

    /// Path to the container's captured stdout log.
    #[must_use]
    pub fn stdout_log_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join("stdout.log")
    }

    /// Path to the container's captured stderr log.
    #[must_use]
    pub fn stderr_log_path(&self, id: &str) -> PathBuf {
        self.container_dir(id).join("stderr.log")
    }

    /// Generates a fresh 8-hex-character id, creates its directory, and
    /// writes the initial metadata. Retries id generation on collision
    /// (ids are random, not locked) rather than
    /// adding cross-process locking — file-level locking remains an
    /// optional, behavior-preserving addition.
    pub fn register(&self, mut state: ContainerState) -> Result<ContainerState> {
        const ATTEMPTS: u32 = 8;
        for _ in 0..ATTEMPTS {
            let id = generate_id();
            match fs::create_dir(self.container_dir(&id)) {
                Ok(()) => {
                    state.id = id;
                    self.write_metadata(&state)?;
                    return Ok(state);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Config(
            "failed to allocate a unique container id".to_owned(),
        ))
    }

    /// Reserves a fresh id up front (creating its directory) without
    /// writing metadata yet, so a caller — the Parent Driver — can key
    /// other per-container resources (the cgroup, the veth device) to the
    /// same id before the container's process even exists. The returned id
    /// must later be threaded through [`Registry::finish_register`].
    pub fn reserve_id(&self) -> Result<String> {
        const ATTEMPTS: u32 = 8;
        for _ in 0..ATTEMPTS {
            let id = generate_id();
            match fs::create_dir(self.container_dir(&id)) {
                Ok(()) => return Ok(id),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Config(
            "failed to allocate a unique container id".to_owned(),
        ))
    }

    /// Writes the initial metadata for an id already reserved via
    /// [`Registry::reserve_id`].
    pub fn finish_register(&self, id: String, mut state: ContainerState) -> Result<ContainerState> {
        state.id = id;
        self.write_metadata(&state)?;
        Ok(state)
    }

    fn write_metadata(&self, state: &ContainerState) -> Result<()> {
        let file = fs::File::create(self.metadata_path(&state.id))?;
        serde_json::to_writer_pretty(file, state)?;
        Ok(())
    }

    /// Loads one container's state by id. Fails with [`Error::NotFound`] if
    /// the directory or metadata is missing or unreadable.
    pub fn get(&self, id: &str) -> Result<ContainerState> {
        let data = fs::read(self.metadata_path(id)).map_err(|_| Error::NotFound(id.to_owned()))?;
        serde_json::from_slice(&data).map_err(|_| Error::NotFound(id.to_owned()))
    }

    /// Enumerates all containers, reconciling `running` status against
    /// actual OS process liveness.
    ///
    /// Directories without valid metadata are skipped silently. A missing
    /// base directory yields an empty list, not an error.
    pub fn list_all(&self) -> Result<Vec<ContainerState>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(id) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(mut state) = self.get(&id) else {
                continue;
            };
            if state.status == Status::Running && !is_alive(state.pid) {
                state.status = Status::Exited;
                state.exit_code = None;
                let _ = self.write_metadata(&state);
            }
            out.push(state);
        }
        Ok(out)
    }

    /// Read-modify-writes a container's status and (optionally) exit code.
    pub fn update_status(&self, id: &str, status: Status, exit_code: Option<i32>) -> Result<()> {
        let mut state = self.get(id)?;
        state.status = status;
        state.exit_code = exit_code;
        self.write_metadata(&state)
    }

    /// Deletes a container's directory. Fails with [`Error::StillRunning`]
    /// if the state says `running` and the PID is still alive.
    pub fn remove(&self, id: &str) -> Result<()> {
        let state = self.get(id)?;
        if state.status == Status::Running && is_alive(state.pid) {
            return Err(Error::StillRunning(id.to_owned()));
        }
        fs::remove_dir_all(self.container_dir(id))?;
        Ok(())
    }
}

/// Reports whether a PID is alive by sending the null signal (a no-op
/// liveness probe that requires no special privilege beyond the usual
/// same-user/root checks `kill(2)` already applies).
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

/// 4 random bytes, rendered as lowercase hex.
fn generate_id() -> String {
    let bytes: [u8; 4] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry(name: &str) -> Registry {
        let dir = std::env::temp_dir().join(format!(
            "jcontainer-registry-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Registry::open_at(dir)
    }

    fn sample_state(pid: u32, status: Status) -> ContainerState {
        ContainerState {
            id: String::new(),
            pid,
            start_time: "2026-01-01T00:00:00Z".to_owned(),
            rootfs: "/tmp/rootfs".to_owned(),
            image: None,
            command: vec!["/bin/sh".to_owned()],
            status,
            exit_code: None,
        }
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let reg = temp_registry("roundtrip");
        let saved = reg
            .register(sample_state(std::process::id(), Status::Running))
            .unwrap();
        let loaded = reg.get(&saved.id).unwrap();
        assert_eq!(saved.id, loaded.id);
        assert_eq!(saved.pid, loaded.pid);
        assert_eq!(saved.start_time, loaded.start_time);
        assert_eq!(saved.rootfs, loaded.rootfs);
        assert_eq!(saved.image, loaded.image);
        assert_eq!(saved.command, loaded.command);
        assert_eq!(saved.status, loaded.status);
        assert_eq!(saved.exit_code, loaded.exit_code);
        assert_eq!(saved.id.len(), 8);
    }

    #[test]
    fn missing_container_is_not_found() {
        let reg = temp_registry("missing");
        assert!(matches!(reg.get("deadbeef"), Err(Error::NotFound(_))));
    }

    #[test]
    fn empty_base_dir_lists_as_empty() {
        let dir = std::env::temp_dir().join(format!(
            "jcontainer-registry-test-nonexistent-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let reg = Registry::open_at(dir);
        assert!(reg.list_all().unwrap().is_empty());
    }

    #[test]
    fn liveness_reconciliation_marks_dead_pid_exited() {
        let reg = temp_registry("liveness");
        let saved = reg
            .register(sample_state(999_999_999, Status::Running))
            .unwrap();
        let all = reg.list_all().unwrap();
        let found = all.iter().find(|s| s.id == saved.id).unwrap();
        assert_eq!(found.status, Status::Exited);
        assert_eq!(found.exit_code, None);

        // The reconciliation is also persisted, not just returned.
        let reloaded = reg.get(&saved.id).unwrap();
        assert_eq!(reloaded.status, Status::Exited);
    }

    #[test]
    fn live_running_container_is_left_alone() {
        let reg = temp_registry("alive");
        let saved = reg
            .register(sample_state(std::process::id(), Status::Running))
            .unwrap();
        let all = reg.list_all().unwrap();
        let found = all.iter().find(|s| s.id == saved.id).unwrap();
        assert_eq!(found.status, Status::Running);
    }

    #[test]
    fn remove_fails_while_running() {
        let reg = temp_registry("stillrunning");
        let saved = reg
            .register(sample_state(std::process::id(), Status::Running))
            .unwrap();
        assert!(matches!(reg.remove(&saved.id), Err(Error::StillRunning(_))));
    }

    #[test]
    fn remove_succeeds_once_exited() {
        let reg = temp_registry("removable");
        let saved = reg
            .register(sample_state(999_999_999, Status::Exited))
            .unwrap();
        reg.remove(&saved.id).unwrap();
        assert!(matches!(reg.get(&saved.id), Err(Error::NotFound(_))));
    }
}
