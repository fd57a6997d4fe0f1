//! Platform detection: selects the Linux or degraded-chroot
//! isolation strategy once at startup. No dynamic dispatch — the value is
//! computed once and threaded through the driver and child initializer as
//! plain data.

/// Isolation strategy selected once at process startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Full namespace isolation: `unshare`, `pivot_root`, cgroups, veth.
    Linux,
    /// Degraded mode for non-Linux development hosts: `chroot` only, no
    /// pid/net/uts namespaces, no cgroups.
    Degraded,
}

impl Platform {
    /// Detects the current platform by inspecting `std::env::consts::OS`.
    #[must_use]
    pub fn detect() -> Self {
        if std::env::consts::OS.contains("linux") {
            Self::Linux
        } else {
            Self::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_matches_build_target() {
        let expected = if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Degraded
        };
        assert_eq!(Platform::detect(), expected);
    }
}
