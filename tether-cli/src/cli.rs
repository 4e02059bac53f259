//! CLI argument definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Tether device agent runtime", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the network namespace of a process
    Namespace {
        /// Process ID (default: current process)
        #[arg(short, long)]
        pid: Option<i32>,
    },

    /// Run a command inside a container's network namespace
    Exec {
        /// Target process ID
        #[arg(short, long, conflicts_with = "container", required_unless_present = "container")]
        pid: Option<i32>,

        /// Target container ID or name (requires the `docker` feature)
        #[arg(short, long)]
        container: Option<String>,

        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}
