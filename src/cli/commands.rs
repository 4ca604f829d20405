//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental extraction and idempotent staging load
#[derive(Parser, Debug)]
#[command(name = "stagesync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML); defaults to ./stagesync.yaml when present
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// DuckDB file, overriding the settings
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract and load entities, one run each
    Run {
        /// Entities to run (repeatable, comma-separated; empty = enabled set)
        #[arg(short, long, value_delimiter = ',')]
        entity: Vec<String>,

        /// Force a full load of the configured bounds
        #[arg(long, conflicts_with = "incremental")]
        full: bool,

        /// Force an incremental load
        #[arg(long)]
        incremental: bool,
    },

    /// Replay failed or hand-picked items
    Reprocess {
        /// Entity of the ids
        #[arg(short, long, required_unless_present = "all_unresolved")]
        entity: Option<String>,

        /// Reference ids (comma-separated)
        #[arg(long, value_delimiter = ',', conflicts_with = "all_unresolved")]
        ids: Vec<String>,

        /// Replay every unresolved failure
        #[arg(long)]
        all_unresolved: bool,
    },

    /// List item failures
    Failures {
        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Include resolved failures
        #[arg(long)]
        all: bool,
    },

    /// List stored watermarks
    Watermarks,

    /// List recent runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Validate settings, database and credentials
    Check,

    /// List known entities
    Entities,

    /// Exchange an authorization code for the first token set
    InitToken {
        /// Authorization code from the consent redirect
        #[arg(long)]
        code: String,

        /// Redirect URI registered for the application
        #[arg(long)]
        redirect_uri: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "stagesync",
            "--config",
            "prod.yaml",
            "run",
            "--entity",
            "product,contact",
            "-e",
            "seller",
            "--full",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("prod.yaml")));
        match cli.command {
            Commands::Run {
                entity,
                full,
                incremental,
            } => {
                assert_eq!(entity, vec!["product", "contact", "seller"]);
                assert!(full);
                assert!(!incremental);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_full_conflicts_with_incremental() {
        assert!(Cli::try_parse_from(["stagesync", "run", "--full", "--incremental"]).is_err());
    }

    #[test]
    fn test_parse_reprocess() {
        let cli = Cli::parse_from(["stagesync", "reprocess", "-e", "product", "--ids", "1,2,3"]);
        match cli.command {
            Commands::Reprocess {
                entity,
                ids,
                all_unresolved,
            } => {
                assert_eq!(entity.as_deref(), Some("product"));
                assert_eq!(ids, vec!["1", "2", "3"]);
                assert!(!all_unresolved);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["stagesync", "reprocess", "--all-unresolved"]).is_ok());
        assert!(Cli::try_parse_from(["stagesync", "reprocess"]).is_err());
    }

    #[test]
    fn test_parse_init_token() {
        let cli = Cli::parse_from([
            "stagesync",
            "init-token",
            "--code",
            "abc",
            "--redirect-uri",
            "https://localhost/cb",
        ]);
        assert!(matches!(cli.command, Commands::InitToken { .. }));
    }
}
