use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run ansible playbooks for deployment roles
#[derive(Parser)]
#[command(name = "rustle-playbook")]
#[command(about = "Turns role descriptors into ansible-playbook runs against deployment nodes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct RustlePlaybookCli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to <config dir>/rustle-playbook/config.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Playbook source cache root
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Directory holding roles/<role>/role.yml
    #[arg(long, global = true)]
    pub playbooks_root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

/// Which node of which deployment snapshot to act on
#[derive(Args, Debug, Clone)]
pub struct NodeTarget {
    /// Deployment snapshot (YAML or JSON)
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Node name within the snapshot
    #[arg(short, long)]
    pub node: String,

    /// Variable bag for the run; defaults to the node's staged data
    #[arg(short, long)]
    pub data: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a role's playbook on a node
    Run {
        #[command(flatten)]
        target: NodeTarget,

        /// Role to run
        role: String,

        /// Only run against the target node's address
        #[arg(long)]
        limit: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the inventory a run would use
    Inventory {
        #[command(flatten)]
        target: NodeTarget,

        /// Role whose descriptor drives the inventory
        role: String,
    },

    /// Evaluate a path or eval: expression for a node
    Resolve {
        #[command(flatten)]
        target: NodeTarget,

        /// Expression, e.g. crowbar/network/admin or eval:ipaddress(all,admin).cidr
        expression: String,

        /// Role the lookup runs as
        #[arg(long, default_value = "playbook")]
        role: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
