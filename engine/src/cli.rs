//! CLI command definitions (§6 "External Interfaces").

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-agent code-generation pipeline orchestrator.
#[derive(Parser)]
#[command(name = "substrate", about = "Multi-agent code-generation pipeline orchestrator", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Emit one NDJSON event per line to stdout instead of human-readable progress
    #[arg(long, global = true)]
    pub ndjson: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive the phase pipeline
    Auto {
        #[command(subcommand)]
        command: AutoCommand,
    },

    /// Request the running session pause at the next tick boundary
    Pause {
        #[arg(long = "session-id")]
        session_id: String,
    },

    /// Request the running session resume
    Resume {
        #[arg(long = "session-id")]
        session_id: String,
    },

    /// Request the running session cancel; in-flight tasks finish, no new work dispatches
    Cancel {
        #[arg(long = "session-id")]
        session_id: String,
    },

    /// Probe configured agent binaries for availability
    Adapters {
        #[arg(long)]
        health: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum AutoCommand {
    /// Start a new pipeline run
    Run {
        /// Methodology pack directory
        #[arg(long, default_value = "packs/default")]
        pack: PathBuf,

        /// Sub-agent binary or adapter name to dispatch each phase to
        #[arg(long, default_value = "claude")]
        agent: String,

        /// First phase to run
        #[arg(long, default_value = "analysis")]
        from: String,

        /// Stop after this phase completes instead of continuing to implementation
        #[arg(long = "stop-after")]
        stop_after: Option<String>,

        /// Hard USD ceiling for the implementation phase's task graph
        #[arg(long = "session-budget")]
        session_budget: Option<f64>,

        /// Max concurrently running implementation tasks
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Path to a task-graph file (required once the implementation phase runs)
        #[arg(long = "task-graph")]
        task_graph: Option<PathBuf>,

        /// Parent run id, for an amendment run that carries forward prior decisions
        #[arg(long = "parent-run-id")]
        parent_run_id: Option<String>,

        /// Short description of the change being explored, included in the amendment context block
        #[arg(long)]
        concept: Option<String>,
    },

    /// Resume a previously started run from its last completed phase
    Resume {
        #[arg(long = "run-id")]
        run_id: String,

        #[arg(long = "stop-after")]
        stop_after: Option<String>,

        #[arg(long = "task-graph")]
        task_graph: Option<PathBuf>,
    },

    /// Print a run's current phase and status
    Status {
        #[arg(long = "run-id")]
        run_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auto_run_with_defaults() {
        let cli = Cli::parse_from(["substrate", "auto", "run"]);
        match cli.command {
            Command::Auto { command: AutoCommand::Run { pack, agent, from, .. } } => {
                assert_eq!(pack, PathBuf::from("packs/default"));
                assert_eq!(agent, "claude");
                assert_eq!(from, "analysis");
            }
            _ => panic!("expected Auto::Run"),
        }
    }

    #[test]
    fn parses_auto_run_with_stop_after_and_budget() {
        let cli = Cli::parse_from(["substrate", "auto", "run", "--stop-after", "planning", "--session-budget", "25.0"]);
        match cli.command {
            Command::Auto { command: AutoCommand::Run { stop_after, session_budget, .. } } => {
                assert_eq!(stop_after, Some("planning".to_string()));
                assert_eq!(session_budget, Some(25.0));
            }
            _ => panic!("expected Auto::Run"),
        }
    }

    #[test]
    fn parses_pause_with_session_id() {
        let cli = Cli::parse_from(["substrate", "pause", "--session-id", "s1"]);
        assert!(matches!(cli.command, Command::Pause { session_id } if session_id == "s1"));
    }

    #[test]
    fn parses_adapters_health() {
        let cli = Cli::parse_from(["substrate", "adapters", "--health"]);
        assert!(matches!(cli.command, Command::Adapters { health: true }));
    }

    #[test]
    fn ndjson_flag_is_global() {
        let cli = Cli::parse_from(["substrate", "--ndjson", "auto", "status", "--run-id", "r1"]);
        assert!(cli.ndjson);
    }
}
