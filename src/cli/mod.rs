//! CLI argument definitions for Lodestar.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Package version with the commit and build time stamped in by build.rs
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("LODESTAR_GIT_COMMIT"),
    " ",
    env!("LODESTAR_BUILD_TIMESTAMP"),
    ")"
);

/// Lodestar - live migration dashboard backend and client.
///
/// Start a simulated backend with `lodestar serve`, upload an archive with
/// `lodestar upload`, then follow it with `lodestar watch <project-id>`.
#[derive(Parser, Debug)]
#[command(name = "lodestar")]
#[command(author, version = VERSION, about = "Live update channel and mock backend for a code-migration dashboard", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Backend base URL for client commands (overrides config and LODESTAR_SERVER_URL)
    #[arg(long, global = true)]
    pub server_url: Option<String>,

    /// Diagnostic log level or filter directive (e.g. debug, lodestar::live=trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit diagnostics on stderr as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the in-memory backend with simulated agents
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Fixed simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a project's simulated event stream without a backend
    ///
    /// Stops after --events events or --seconds seconds, whichever comes first.
    Simulate {
        /// Project identifier the events are scoped to
        #[arg(default_value = "demo")]
        project_id: String,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        events: Option<usize>,

        /// Stop after this many seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Fixed simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List uploaded projects
    Projects,

    /// Show one project with its agents
    Show {
        /// Project ID (e.g., proj-1a2b3c4d5e6f)
        project_id: String,
    },

    /// Upload a codebase archive
    Upload {
        /// Path to the archive
        archive: PathBuf,

        /// Project name (defaults to the archive's file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show a project's knowledge graph
    Graph {
        /// Project ID
        project_id: String,

        /// Assign node positions with the force-directed layout
        #[arg(long)]
        layout: bool,
    },

    /// Print one file from a project
    File {
        /// Project ID
        project_id: String,

        /// Path inside the project
        path: String,
    },

    /// Ask the backend to (re)run an agent
    RunAgent {
        /// Project ID
        project_id: String,

        /// Agent ID (e.g., agent-0)
        agent_id: String,
    },

    /// Apply a reviewed patch to a project file
    ApplyPatch {
        /// Project ID
        project_id: String,

        /// File the patch replaces, relative to the project root
        #[arg(long)]
        file: String,

        /// Local file holding the new content
        #[arg(long)]
        content: PathBuf,

        /// Who approved the patch
        #[arg(long)]
        author: Option<String>,
    },

    /// Follow a project's live channel and print the dashboard state
    Watch {
        /// Project ID
        project_id: String,

        /// How long to follow the channel
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Log severity to show: all, info, warn or error
        #[arg(long, default_value = "all")]
        level: String,

        /// Log lines to include in the output
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,

    /// Set a value in config.kdl
    Set {
        /// Configuration key (e.g., port, server-url, agent-tick-ms)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the config.kdl location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_defaults() {
        let cli = Cli::parse_from(["lodestar", "watch", "proj-1"]);
        match cli.command {
            Commands::Watch {
                project_id,
                seconds,
                level,
                tail,
            } => {
                assert_eq!(project_id, "proj-1");
                assert_eq!(seconds, 10);
                assert_eq!(level, "all");
                assert_eq!(tail, 20);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["lodestar", "projects", "-H", "--server-url", "http://x:1"]);
        assert!(cli.human_readable);
        assert_eq!(cli.server_url.as_deref(), Some("http://x:1"));
    }
}
