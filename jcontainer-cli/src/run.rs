//! `jcontainer run` and the internal `child` re-exec target.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use jcontainer::config::{RunConfig, parse_cpu_percent, parse_memory};
use jcontainer::platform::Platform;
use jcontainer::state::Registry;
use jcontainer::{child, driver};

/// Arguments for the `jcontainer run` subcommand.
#[derive(clap::Args)]
pub struct RunArgs {
    /// OCI image reference (e.g., ubuntu:latest). Auto-pulled if not cached.
    #[arg(long)]
    image: Option<String>,

    /// Set up a veth pair into the container's network namespace.
    #[arg(long)]
    net: bool,

    /// Memory limit, e.g. `512m`, `2g`. No suffix means bytes.
    #[arg(long)]
    memory: Option<String>,

    /// CPU limit as a percent of one core (100 = one core).
    #[arg(long)]
    cpu: Option<String>,

    /// `[ROOTFS] CMD [ARGS...]` — ROOTFS is required unless `--image` is given.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    args: Vec<String>,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = self.into_config()?;
        let registry = Registry::open();
        let outcome = driver::run(&config, &registry, |msg| eprintln!("{msg}"))?;
        std::process::exit(outcome.exit_code);
    }

    fn into_config(self) -> Result<RunConfig> {
        let memory_bytes = self.memory.as_deref().map(parse_memory).transpose()?;
        let cpu_percent = self.cpu.as_deref().map(parse_cpu_percent).transpose()?;

        let (rootfs, command) = if self.image.is_some() {
            (None, self.args)
        } else {
            let mut args = self.args.into_iter();
            let rootfs = args.next().context("specify --image or ROOTFS CMD [ARGS...]")?;
            (Some(PathBuf::from(rootfs)), args.collect())
        };
        if command.is_empty() {
            bail!("no command given to run inside the container");
        }

        Ok(RunConfig {
            rootfs,
            image: self.image,
            command,
            memory_bytes,
            cpu_percent,
            network: self.net,
        })
    }
}

/// Internal `child` subcommand: runs the Child Initializer in place of the
/// re-exec spawned by [`driver::run`]. Never returns on success.
pub fn child(rootfs: PathBuf, command: Vec<String>) -> Result<()> {
    let platform = Platform::detect();
    child::init(platform, &rootfs, &command)?;
    unreachable!("child::init execs the target command or returns an error");
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::RunArgs;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn parses_net_memory_cpu_and_rootfs() {
        let cli = TestCli::try_parse_from([
            "jcontainer", "--net", "--memory", "100m", "--cpu", "50", "/rootfs", "/bin/sh",
        ])
        .unwrap();
        let config = cli.args.into_config().unwrap();
        assert_eq!(config.rootfs.unwrap().to_str().unwrap(), "/rootfs");
        assert_eq!(config.command, vec!["/bin/sh".to_owned()]);
        assert_eq!(config.memory_bytes, Some(100 * 1024 * 1024));
        assert_eq!(config.cpu_percent, Some(50));
        assert!(config.network);
    }

    #[test]
    fn image_makes_rootfs_optional() {
        let cli = TestCli::try_parse_from(["jcontainer", "--image", "alpine:3.19", "/bin/sh"]).unwrap();
        let config = cli.args.into_config().unwrap();
        assert!(config.rootfs.is_none());
        assert_eq!(config.image.as_deref(), Some("alpine:3.19"));
        assert_eq!(config.command, vec!["/bin/sh".to_owned()]);
    }

    #[test]
    fn rootfs_with_no_command_is_an_error() {
        let cli = TestCli::try_parse_from(["jcontainer", "/bin/sh"]).unwrap();
        assert!(cli.args.into_config().is_err());
    }
}
