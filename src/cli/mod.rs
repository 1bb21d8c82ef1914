//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tracebom",
    version,
    about = "Dynamic cryptography inventory for traced processes",
    long_about = "Tracebom drives an eBPF tracer against OpenSSL workloads, correlates the \
                  probe events into per-algorithm usage records, classifies them with \
                  configurable rules, and emits a CycloneDX 1.6 CBOM. Generated inventories \
                  can be compared against a ground-truth CBOM to score detection quality."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/tracebom/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correlate a tracer log and write the CBOM inventory
    ParseLog {
        /// Tracer log file to process
        log_file: PathBuf,

        /// Output CBOM path (defaults to paths.output_file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rules file (defaults to paths.rules_file)
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },

    /// Compare a generated CBOM against a reference CBOM
    Compare {
        /// Generated (candidate) CBOM
        candidate: PathBuf,

        /// Ground-truth (reference) CBOM
        reference: PathBuf,

        /// Minimum similarity for a confirmed match
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a command under the tracer and record its crypto activity
    RunTarget {
        /// Probe script (defaults to tracer.script)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Log file to write (defaults to paths.log_file)
        #[arg(short, long)]
        log_file: Option<PathBuf>,

        /// Target command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Attach the tracer to a running process
    AttachPid {
        /// Process id to attach to
        pid: i32,

        /// Probe script (defaults to tracer.script)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Log file to write (defaults to paths.log_file)
        #[arg(short, long)]
        log_file: Option<PathBuf>,
    },

    /// Trace system-wide until interrupted
    GlobalTrace {
        /// Probe script (defaults to tracer.script)
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Log file to write (defaults to paths.log_file)
        #[arg(short, long)]
        log_file: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration, rules and probe script
    Init {
        /// Force overwrite existing files
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
    fn test_run_target_collects_trailing_command() {
        let cli = Cli::parse_from([
            "tracebom",
            "run-target",
            "--log-file",
            "/tmp/t.log",
            "--",
            "openssl",
            "speed",
            "aes-128-cbc",
        ]);
        match cli.command {
            Commands::RunTarget {
                command, log_file, ..
            } => {
                assert_eq!(command, vec!["openssl", "speed", "aes-128-cbc"]);
                assert_eq!(log_file, Some(PathBuf::from("/tmp/t.log")));
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_compare_accepts_threshold() {
        let cli = Cli::parse_from([
            "tracebom",
            "compare",
            "cbom.json",
            "reference.json",
            "--threshold",
            "0.75",
            "--json",
        ]);
        match cli.command {
            Commands::Compare {
                threshold, json, ..
            } => {
                assert_eq!(threshold, Some(0.75));
                assert!(json);
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }
}
