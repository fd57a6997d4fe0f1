//! veth pair networking: shells out to the host's `ip` and
//! `nsenter` utilities in a fixed eight-command sequence. This is the one
//! component where the ambient stack is deliberately *not* a Rust
//! networking crate — the contract here is literally "run these host CLI
//! tools" — matching how this workspace already treats subprocess
//! orchestration as the unit of work for external helpers.

use std::process::Command;

use crate::{Error, Result};

/// Host-side IP assigned to the veth pair.
const HOST_ADDR: &str = "10.0.0.1/24";
/// Container-side IP assigned to the veth pair.
const CONTAINER_ADDR: &str = "10.0.0.2/24";
/// Default route target inside the container.
const GATEWAY: &str = "10.0.0.1";

/// Manages one veth pair for a single container's network namespace.
///
/// The host-side device name is keyed by container id, preventing
/// collisions across concurrently running containers on the same host.
#[derive(Debug, Clone)]
pub struct NetworkManager {
    /// Host-side device name, `veth-<container-id>`.
    host_dev: String,
}

impl NetworkManager {
    /// Binds a manager to a container id.
    #[must_use]
    pub fn new(container_id: &str) -> Self {
        Self {
            host_dev: format!("veth-{container_id}"),
        }
    }

    /// Runs the fixed eight-command sequence wiring `eth0` inside
    /// `child_pid`'s network namespace to this host-side veth. Any failure
    /// is fatal to *this setup*, but never to the container — the caller
    /// demotes a returned error to a warning and runs without networking.
    pub fn setup(&self, child_pid: u32) -> Result<()> {
        let netns = format!("--net=/proc/{child_pid}/ns/net");

        run("ip", &[
            "link", "add", &self.host_dev, "type", "veth", "peer", "name", "eth0",
        ])?;
        run("ip", &["link", "set", "eth0", "netns", &child_pid.to_string()])?;
        run("ip", &["addr", "add", HOST_ADDR, "dev", &self.host_dev])?;
        run("ip", &["link", "set", &self.host_dev, "up"])?;
        run("nsenter", &[&netns, "ip", "addr", "add", CONTAINER_ADDR, "dev", "eth0"])?;
        run("nsenter", &[&netns, "ip", "link", "set", "eth0", "up"])?;
        run("nsenter", &[&netns, "ip", "link", "set", "lo", "up"])?;
        run("nsenter", &[&netns, "ip", "route", "add", "default", "via", GATEWAY])?;
        Ok(())
    }

    /// Deletes the host-side veth device; the kernel removes its peer
    /// automatically. Safe to call even if `setup` was never run or failed
    /// partway through.
    pub fn close(&self) {
        let _ = run("ip", &["link", "delete", &self.host_dev]);
    }
}

/// Runs a helper command to completion, mapping a nonzero exit or spawn
/// failure to [`Error::Network`].
fn run(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| Error::Network(format!("{program}: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Network(format!(
            "{program} {args:?} exited with {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_dev_is_keyed_by_container_id() {
        let a = NetworkManager::new("aaaa1111");
        let b = NetworkManager::new("bbbb2222");
        assert_ne!(a.host_dev, b.host_dev);
        assert_eq!(a.host_dev, "veth-aaaa1111");
    }

    #[test]
    fn close_without_setup_is_a_noop() {
        // ip may not even be installed in this environment; close() must
        // swallow the failure either way.
        let mgr = NetworkManager::new("neverused");
        mgr.close();
    }
}
