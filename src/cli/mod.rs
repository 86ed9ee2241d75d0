//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "iedp",
    version,
    about = "Intelligent enterprise document processing: hybrid retrieval and multimodal reasoning",
    long_about = "IEDP indexes text, tables, PDFs and images with a hybrid dense+sparse retriever, \
                  reasons over retrieved fragments with a multimodal reasoner, and orchestrates \
                  multi-step analysis and extraction tasks from the command line or over HTTP."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/iedp/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Environment whose profile is applied (overrides app.env)
    #[arg(short, long, global = true, value_name = "ENV")]
    pub env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data, model and cache directories and a default config file
    Init {
        /// Log level written to the new config (DEBUG, INFO, WARNING, ERROR, CRITICAL)
        #[arg(short, long)]
        log_level: Option<String>,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Analyze a single document
    Analyze {
        /// Path to a text, table, PDF or image file
        document_path: PathBuf,

        /// Question to answer (summarizes the document when omitted)
        #[arg(short, long)]
        query: Option<String>,

        /// Print the full task report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize every document in the data directory
    ProcessBatch {
        /// Maximum number of documents to process
        #[arg(short, long)]
        limit: Option<usize>,

        /// Directory to read (defaults to paths.data_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Print the task reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve fragments from the data directory
    Retrieve {
        /// Search query text
        query: String,

        /// Maximum number of results to return (defaults to retrieval.k)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP API over the data directory
    Serve {
        /// Bind address (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show only one section (e.g. "retrieval")
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write the default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::parse_from([
            "iedp", "--env", "prod", "analyze", "report.pdf", "-q", "totals",
        ]);
        assert_eq!(cli.env.as_deref(), Some("prod"));
        match cli.command {
            Commands::Analyze {
                document_path,
                query,
                json,
            } => {
                assert_eq!(document_path, PathBuf::from("report.pdf"));
                assert_eq!(query.as_deref(), Some("totals"));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_process_batch() {
        let cli = Cli::parse_from(["iedp", "process-batch", "--limit", "3", "--json"]);
        assert!(matches!(
            cli.command,
            Commands::ProcessBatch {
                limit: Some(3),
                dir: None,
                json: true
            }
        ));
    }
}
