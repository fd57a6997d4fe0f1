//! CLI for jcontainer, a minimal OCI-compatible container runtime.

#![allow(clippy::print_stdout, clippy::print_stderr, clippy::missing_docs_in_private_items)]

mod lifecycle;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use run::RunArgs;

#[derive(Parser)]
#[command(name = "jcontainer", version, about = "Minimal OCI-compatible container runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command in an isolated container.
    Run(Box<RunArgs>),
    /// Internal: run the Child Initializer inside the new namespaces.
    #[command(hide = true)]
    Child {
        /// Root filesystem to pivot/chroot into.
        rootfs: PathBuf,
        /// Command and arguments to exec.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// List known containers.
    List,
    /// Stop a running container.
    Stop {
        /// Container id.
        id: String,
    },
    /// Print a container's captured stdout/stderr.
    Logs {
        /// Container id.
        id: String,
    },
    /// Remove a stopped container's registry entry.
    Rm {
        /// Container id.
        id: String,
    },
}

fn main() {
    if let Err(e) = Cli::parse().dispatch() {
        eprintln!("jcontainer: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Run(args) => args.run(),
            Command::Child { rootfs, command } => run::child(rootfs, command),
            Command::List => lifecycle::list(),
            Command::Stop { id } => lifecycle::stop(&id),
            Command::Logs { id } => lifecycle::logs(&id),
            Command::Rm { id } => lifecycle::rm(&id),
        }
    }
}
