//! list/stop/logs/rm commands over the Container Registry.

use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::Result;
use crate::state::{Registry, Status, is_alive};

/// Poll cadence while waiting for SIGTERM to take effect.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Total grace period before escalating to SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Renders the `list` table to `out`: `id | pid | image | status |
/// startTime`. Exited containers render status as `exited(<code>)` when the
/// exit code is known. An empty registry prints a friendly message instead
/// of an empty table.
pub fn list(registry: &Registry, out: &mut impl Write) -> Result<()> {
    let containers = registry.list_all()?;
    if containers.is_empty() {
        writeln!(out, "No containers found.")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<10} {:<8} {:<30} {:<14} {}",
        "ID", "PID", "IMAGE", "STATUS", "START TIME"
    )?;
    for c in &containers {
        let status = match (c.status, c.exit_code) {
            (Status::Exited, Some(code)) => format!("exited({code})"),
            (Status::Exited, None) => "exited".to_owned(),
            (Status::Running, _) => "running".to_owned(),
            (Status::Stopped, _) => "stopped".to_owned(),
        };
        writeln!(
            out,
            "{:<10} {:<8} {:<30} {:<14} {}",
            c.id,
            c.pid,
            c.image.as_deref().unwrap_or("-"),
            status,
            c.start_time
        )?;
    }
    Ok(())
}

/// Sends SIGTERM, polling liveness for up to 10s, escalating to SIGKILL if
/// the process is still alive. Already-stopped/exited containers and
/// already-dead PIDs short-circuit without signaling. The final recorded
/// state is always `stopped` along the signaling path, with a null exit
/// code (the real exit code, if any, is unobservable from here).
pub fn stop(registry: &Registry, id: &str, not_running_out: &mut impl Write) -> Result<()> {
    let state = registry.get(id)?;
    if state.status != Status::Running {
        writeln!(not_running_out, "not running")?;
        return Ok(());
    }
    if !is_alive(state.pid) {
        return registry.update_status(id, Status::Exited, None);
    }

    let Ok(pid) = i32::try_from(state.pid) else {
        return registry.update_status(id, Status::Stopped, None);
    };
    let pid = Pid::from_raw(pid);
    let _ = kill(pid, Signal::SIGTERM);

    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline && is_alive(state.pid) {
        thread::sleep(STOP_POLL_INTERVAL);
    }
    if is_alive(state.pid) {
        let _ = kill(pid, Signal::SIGKILL);
    }

    registry.update_status(id, Status::Stopped, None)
}

/// Prints `stdout.log` to `stdout_out` and `stderr.log` to `stderr_out`. If
/// neither file exists, prints a friendly message to `stdout_out` instead.
pub fn logs(
    registry: &Registry,
    id: &str,
    stdout_out: &mut impl Write,
    stderr_out: &mut impl Write,
) -> Result<()> {
    registry.get(id)?; // validates the id exists before touching log files

    let out_data = std::fs::read(registry.stdout_log_path(id)).ok();
    let err_data = std::fs::read(registry.stderr_log_path(id)).ok();

    if out_data.is_none() && err_data.is_none() {
        writeln!(stdout_out, "No logs available")?;
        return Ok(());
    }
    if let Some(data) = out_data {
        stdout_out.write_all(&data)?;
    }
    if let Some(data) = err_data {
        stderr_out.write_all(&data)?;
    }
    Ok(())
}

/// Removes a container's registry entry, delegating the `still-running`
/// guard to [`Registry::remove`].
pub fn rm(registry: &Registry, id: &str) -> Result<()> {
    registry.remove(id)
}
