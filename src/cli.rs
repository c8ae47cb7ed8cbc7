//! CLI argument parsing for lg.

use crate::storage::DEFAULT_STATE_FILE;
use clap::{Parser, Subcommand};
use lineage::{NodeType, Status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lg",
    about = "Dependency graph of pipeline artifacts and development tasks",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to: ~/.local/share/lineage/logs/lineage.log"
)]
pub struct Cli {
    /// Path to the graph document
    #[arg(short = 'f', long, global = true, default_value = DEFAULT_STATE_FILE)]
    pub file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

fn parse_node_type(s: &str) -> Result<NodeType, String> {
    NodeType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = NodeType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown node type '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn parse_status(s: &str) -> Result<Status, String> {
    Status::parse(s).ok_or_else(|| format!("unknown status '{}' (expected pending, active, valid or stale)", s))
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty graph document
    Init,

    /// Add a node
    Add {
        /// Node ID (e.g. analysis.ep01)
        id: String,

        /// Node type (data_source, parameter, analysis, report, task)
        #[arg(short = 't', long = "type", value_parser = parse_node_type)]
        node_type: NodeType,

        /// Title
        title: String,

        /// Dependencies (comma-separated)
        #[arg(short, long = "deps", value_delimiter = ',')]
        deps: Vec<String>,

        /// Tags (comma-separated)
        #[arg(short = 'l', long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Make FROM depend on TO
    Dep { from: String, to: String },

    /// Remove the dependency FROM -> TO
    Undep { from: String, to: String },

    /// Set a node's status
    SetStatus {
        id: String,

        #[arg(value_parser = parse_status)]
        status: Status,
    },

    /// Mark a node and everything downstream of it stale
    Invalidate { id: String },

    /// Claim a pending task whose dependencies are all valid
    Claim { id: String },

    /// Show one node
    Show { id: String },

    /// List nodes
    List {
        /// Filter by type
        #[arg(short = 't', long = "type", value_parser = parse_node_type)]
        node_type: Option<NodeType>,

        /// Filter by status
        #[arg(short, long, value_parser = parse_status)]
        status: Option<Status>,

        /// Filter by tag
        #[arg(short = 'l', long)]
        tag: Option<String>,
    },

    /// Pending tasks that can start now
    Plannable,

    /// Pending tasks waiting on something
    Blocked,

    /// Claimed tasks
    Active,

    /// Execution waves, assuming every planned task succeeds
    Waves,

    /// Stale nodes in revalidation order
    Stale,

    /// Audit the graph
    Validate,

    /// Node and status counts
    Summary,

    /// What invalidating a node would touch
    Impact { id: String },

    /// Dependency order of the whole graph
    Order,

    /// Longest dependency chain
    CriticalPath,

    /// Nodes with no dependencies and no dependents
    Orphans,

    /// Dependency paths from a producer to a consumer
    Paths {
        from: String,
        to: String,

        /// Maximum number of paths
        #[arg(short, long, default_value = "10")]
        max: usize,
    },

    /// Nodes with a tag (or of a type) and their neighbours
    Subgraph {
        #[arg(short = 'l', long)]
        tag: Option<String>,

        #[arg(short = 't', long = "type", value_parser = parse_node_type)]
        node_type: Option<NodeType>,

        /// Hops to follow in each direction
        #[arg(long, default_value = "1")]
        depth: usize,
    },

    /// Sync task nodes from a directory of NNN_slug.md task files
    Sync { dir: PathBuf },

    /// Show the event history
    History {
        /// Only the most recent N events
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}
