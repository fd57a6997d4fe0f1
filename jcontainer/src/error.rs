//! Error types for jcontainer's core runtime: platform syscalls, cgroups,
//! networking, container state, and orchestration.

/// Alias for `Result<T, jcontainer::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from jcontainer's core runtime operations, one variant per row of
/// the error taxonomy this system is specified against.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// CLI argument parsing or `RunConfig` validation failed.
    #[error("config error: {0}")]
    Config(String),

    /// Image resolution (pull) failed; wraps the OCI crate's own taxonomy.
    #[error(transparent)]
    Oci(#[from] jcontainer_oci::Error),

    /// A namespace/mount/`pivot_root`/exec syscall failed. Fatal in the
    /// child; the parent observes it as the child's nonzero exit code.
    #[error("syscall error: {0}")]
    Syscall(String),

    /// A cgroupfs write failed. Never fatal to the container — the caller
    /// demotes this to a warning and proceeds without limits.
    #[error("cgroup error: {0}")]
    Cgroup(String),

    /// A helper command (`ip`/`nsenter`) exited nonzero or failed to spawn.
    /// Never fatal to the container — the caller demotes this to a warning
    /// and proceeds without networking.
    #[error("network error: {0}")]
    Network(String),

    /// A container id did not correspond to a registered container.
    #[error("container not found: {0}")]
    NotFound(String),

    /// `rm` was attempted on a container whose process is still alive.
    #[error("container {0} is still running; stop it first")]
    StillRunning(String),

    /// Filesystem or process I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of container metadata failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
