//! The Parent Driver: orchestrates one container launch end-to-end. Strict
//! sequence: resolve rootfs → unshare (Linux only, in the *current* process,
//! so later per-container mounts don't leak to the host) → reserve a
//! container id → create the cgroup and set its limits → build & spawn the
//! child re-exec → finish registering → tee stdout/stderr → cgroup-attach →
//! network setup → wait → record final status → tear down network, then
//! cgroup, in that order, on every exit path.
//!
//! The "two-stage parent/child handoff" is implemented as a literal
//! re-exec: `unshare --pid [--net] --fork <current_exe> child <rootfs>
//! <argv...>`. `CLONE_NEWPID` only affects *subsequently created* children,
//! so the process running the Child Initializer must already be PID 1 in a
//! fresh PID namespace when it starts — `unshare --fork` guarantees this.
//!
//! The container id is reserved before the cgroup is created so the cgroup
//! directory and the eventual registry entry share one id, even though the
//! cgroup must exist before the child — and therefore its PID — exists.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use jcontainer_oci::Oci;

use crate::cgroup::CgroupManager;
use crate::config::RunConfig;
use crate::network::NetworkManager;
use crate::platform::Platform;
use crate::state::{ContainerState, Registry, Status};
use crate::syscall;
use crate::{Error, Result};

/// Deadline for joining the tee threads after the child exits.
const TEE_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a completed `run` invocation.
#[derive(Debug)]
pub struct RunOutcome {
    /// The registered container's id.
    pub id: String,
    /// The child process's exit code — the caller passes this through as
    /// its own exit code on success.
    pub exit_code: i32,
}

/// Runs `config` end-to-end: resolves the rootfs, launches the isolated
/// child, and waits for it to finish. `on_status` receives human-readable
/// progress and warning lines as they happen.
pub fn run(config: &RunConfig, registry: &Registry, on_status: impl Fn(&str)) -> Result<RunOutcome> {
    let platform = Platform::detect();
    if platform == Platform::Degraded {
        on_status(
            "warning: non-Linux host — running in degraded chroot-only mode \
             (no pid/net/uts isolation, no cgroups)",
        );
    }

    let rootfs = resolve_rootfs(config, &on_status)?;

    if platform == Platform::Linux {
        syscall::unshare(syscall::CLONE_NEWNS | syscall::CLONE_NEWUTS)
            .map_err(|e| Error::Syscall(format!("unshare(CLONE_NEWNS|CLONE_NEWUTS): {e}")))?;
    }

    let id = registry.reserve_id()?;

    let cgroup = (platform == Platform::Linux)
        .then(|| setup_cgroup(&id, config, &on_status))
        .flatten();

    let mut child = spawn_child(platform, config, &rootfs)?;
    let pid = child.id();

    let state = registry.finish_register(id, new_container_state(pid, &rootfs, config))?;
    eprintln!("Container {} started (PID {pid})", state.id);

    let stdout_tee = spawn_tee(child.stdout.take(), registry.stdout_log_path(&state.id), std::io::stdout());
    let stderr_tee = spawn_tee(child.stderr.take(), registry.stderr_log_path(&state.id), std::io::stderr());

    if let Some(cgroup) = &cgroup {
        if let Err(e) = cgroup.add_process(pid) {
            on_status(&format!("warning: cgroup attach failed: {e}"));
        }
    }

    let network = (config.network && platform == Platform::Linux)
        .then(|| setup_network(&state.id, pid, &on_status));

    let wait_result = child.wait();

    join_tee(stdout_tee);
    join_tee(stderr_tee);

    if let Some(net) = &network {
        net.close();
    }
    if let Some(cg) = &cgroup {
        cg.close();
    }

    let status = wait_result?;
    let exit_code = status.code().unwrap_or(-1);
    registry.update_status(&state.id, Status::Exited, Some(exit_code))?;

    Ok(RunOutcome { id: state.id, exit_code })
}

/// Resolves the rootfs to launch: an already-prepared path, or a freshly
/// pulled (or cache-hit) OCI image.
fn resolve_rootfs(config: &RunConfig, on_status: &impl Fn(&str)) -> Result<PathBuf> {
    if let Some(image) = &config.image {
        let oci = Oci::open();
        let result = oci.ensure(image, |msg| on_status(msg))?;
        Ok(result.rootfs)
    } else {
        config
            .rootfs
            .clone()
            .ok_or_else(|| Error::Config("no --image or rootfs path given".to_owned()))
    }
}

/// Builds and spawns the re-exec that carries out the namespace handoff
/// (Linux) or runs the Child Initializer directly (degraded).
fn spawn_child(platform: Platform, config: &RunConfig, rootfs: &Path) -> Result<Child> {
    let self_exe = std::env::current_exe()?;

    let mut cmd = match platform {
        Platform::Linux => {
            let mut cmd = Command::new("unshare");
            cmd.arg("--pid");
            if config.network {
                cmd.arg("--net");
            }
            cmd.arg("--fork").arg(&self_exe).arg("child").arg(rootfs);
            cmd
        }
        Platform::Degraded => {
            let mut cmd = Command::new(&self_exe);
            cmd.arg("child").arg(rootfs);
            cmd
        }
    };

    cmd.args(&config.command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    cmd.spawn()
        .map_err(|e| Error::Syscall(format!("spawning child re-exec: {e}")))
}

/// Builds the registry entry for a just-spawned container, timestamped now.
fn new_container_state(pid: u32, rootfs: &Path, config: &RunConfig) -> ContainerState {
    ContainerState {
        id: String::new(),
        pid,
        start_time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        rootfs: rootfs.to_string_lossy().into_owned(),
        image: config.image.clone(),
        command: config.command.clone(),
        status: Status::Running,
        exit_code: None,
    }
}

/// Creates the container's cgroup and applies any requested limits before
/// the child is spawned. A failure here is demoted to a warning and the
/// container runs unconstrained, same as a network setup failure.
fn setup_cgroup(id: &str, config: &RunConfig, on_status: &impl Fn(&str)) -> Option<CgroupManager> {
    if config.memory_bytes.is_none() && config.cpu_percent.is_none() {
        return None;
    }
    let mgr = CgroupManager::new(id);
    if let Err(e) = mgr.create() {
        on_status(&format!("warning: cgroup create failed: {e}"));
        return None;
    }
    if let Some(bytes) = config.memory_bytes {
        if let Err(e) = mgr.set_memory_limit(bytes) {
            on_status(&format!("warning: setting memory limit failed: {e}"));
        }
    }
    if let Some(percent) = config.cpu_percent {
        if let Err(e) = mgr.set_cpu_limit(percent) {
            on_status(&format!("warning: setting cpu limit failed: {e}"));
        }
    }
    Some(mgr)
}

/// Sets up the container's veth pair once the child's PID is known,
/// demoting any failure to a warning and leaving networking disabled.
fn setup_network(id: &str, child_pid: u32, on_status: &impl Fn(&str)) -> NetworkManager {
    let mgr = NetworkManager::new(id);
    if let Err(e) = mgr.setup(child_pid) {
        on_status(&format!("warning: network setup failed: {e}"));
        mgr.close();
    }
    mgr
}

/// Spawns a thread that copies `src` to both `tee_to` and a freshly created
/// log file at `log_path`, until EOF. Returns `None` if `src` is absent.
fn spawn_tee(
    src: Option<impl std::io::Read + Send + 'static>,
    log_path: PathBuf,
    mut tee_to: impl std::io::Write + Send + 'static,
) -> Option<JoinHandle<()>> {
    let mut src = src?;
    Some(std::thread::spawn(move || {
        let Ok(mut log) = std::fs::File::create(&log_path) else {
            return;
        };
        let mut buf = [0_u8; 8192];
        loop {
            use std::io::{Read, Write};
            match src.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let _ = log.write_all(&buf[..n]);
                    let _ = tee_to.write_all(&buf[..n]);
                }
            }
        }
    }))
}

/// Joins a tee thread, giving up after [`TEE_JOIN_TIMEOUT`]. An unfinished
/// thread is left to exit on its own once the pipe closes; it never blocks
/// the driver beyond the deadline.
fn join_tee(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else { return };
    let deadline = Instant::now() + TEE_JOIN_TIMEOUT;
    while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
}
