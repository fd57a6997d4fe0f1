//! The CLI/driver configuration boundary: a single validated `RunConfig` so
//! the Parent Driver never touches `clap` types directly, plus the
//! `--memory`/`--cpu` grammar's parsing and validation.

use std::path::PathBuf;

use crate::{Error, Result};

/// Validated configuration for a single `run` invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root filesystem path, when not resolved from `image`.
    pub rootfs: Option<PathBuf>,
    /// OCI image reference, when the rootfs is resolved from an image.
    pub image: Option<String>,
    /// Command and arguments to exec inside the container.
    pub command: Vec<String>,
    /// Memory limit in bytes, if `--memory` was given.
    pub memory_bytes: Option<u64>,
    /// CPU limit as a percent of one core (100 = one core), if `--cpu` was given.
    pub cpu_percent: Option<u32>,
    /// Whether to set up a veth pair into the container's network namespace.
    pub network: bool,
}

/// Parses a `--memory` argument matching `/^(\d+)([kmg]?)$/i`.
///
/// Suffix multipliers: none = 1, `k` = 1024, `m` = 1024², `g` = 1024³. The
/// result must evaluate to a value greater than zero.
pub fn parse_memory(s: &str) -> Result<u64> {
    let (digits, suffix) = match s.chars().next_back() {
        Some(c) if c.is_ascii_alphabetic() => (&s[..s.len() - 1], Some(c.to_ascii_lowercase())),
        _ => (s, None),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Config(format!("invalid memory size: {s}")));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("memory size out of range: {s}")))?;
    let multiplier: u64 = match suffix {
        None => 1,
        Some('k') => 1024,
        Some('m') => 1024 * 1024,
        Some('g') => 1024 * 1024 * 1024,
        Some(_) => return Err(Error::Config(format!("invalid memory suffix: {s}"))),
    };
    let bytes = value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("memory size overflows u64: {s}")))?;
    if bytes == 0 {
        return Err(Error::Config("memory size must be greater than zero".to_owned()));
    }
    Ok(bytes)
}

/// Parses a `--cpu` argument: a positive integer percent (100 = one core).
pub fn parse_cpu_percent(s: &str) -> Result<u32> {
    let value: u32 = s
        .parse()
        .map_err(|_| Error::Config(format!("invalid cpu percent: {s}")))?;
    if value == 0 {
        return Err(Error::Config("cpu percent must be greater than zero".to_owned()));
    }
    Ok(value)
}

/// Returns `$HOME`, falling back to `.` if unset (mirrors the OCI crate's
/// own cache-root fallback so both halves of the system agree on a base
/// directory even in a minimal environment).
#[must_use]
pub fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_owned()))
}

/// `$HOME/.jcontainer/containers`, the Container Registry's base directory.
#[must_use]
pub fn containers_root() -> PathBuf {
    home_dir().join(".jcontainer").join("containers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_suffixes_apply_correct_multipliers() {
        assert_eq!(parse_memory("100").unwrap(), 100);
        assert_eq!(parse_memory("100k").unwrap(), 100 * 1024);
        assert_eq!(parse_memory("100m").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_memory("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory("100M").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_memory("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn memory_rejects_zero_and_garbage() {
        assert!(parse_memory("0").is_err());
        assert!(parse_memory("abc").is_err());
        assert!(parse_memory("-5").is_err());
        assert!(parse_memory("5x").is_err());
        assert!(parse_memory("").is_err());
    }

    #[test]
    fn cpu_percent_must_be_positive_integer() {
        assert_eq!(parse_cpu_percent("50").unwrap(), 50);
        assert_eq!(parse_cpu_percent("200").unwrap(), 200);
        assert!(parse_cpu_percent("0").is_err());
        assert!(parse_cpu_percent("-1").is_err());
        assert!(parse_cpu_percent("abc").is_err());
    }
}
