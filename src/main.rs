use tracebom::cbom::{Assembler, Cbom};
use tracebom::cli::{Cli, Commands, ConfigAction};
use tracebom::config::{expand_path, Config};
use tracebom::correlation::Correlator;
use tracebom::error::{Result, TracebomError};
use tracebom::matching::{MatchReport, Matcher};
use tracebom::rules::RuleSet;
use tracebom::tracer::Tracer;

use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::ParseLog {
            log_file,
            output,
            rules,
        } => {
            cmd_parse_log(cli.config, log_file, output, rules)?;
        }
        Commands::Compare {
            candidate,
            reference,
            threshold,
            json,
        } => {
            cmd_compare(cli.config, candidate, reference, threshold, json)?;
        }
        Commands::RunTarget {
            script,
            log_file,
            command,
        } => {
            cmd_run_target(cli.config, script, log_file, command)?;
        }
        Commands::AttachPid {
            pid,
            script,
            log_file,
        } => {
            cmd_attach_pid(cli.config, pid, script, log_file)?;
        }
        Commands::GlobalTrace { script, log_file } => {
            cmd_global_trace(cli.config, script, log_file)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "tracebom=debug"
    } else {
        "tracebom=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_parse_log(
    config_path: Option<PathBuf>,
    log_file: PathBuf,
    output: Option<PathBuf>,
    rules: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;

    let rules_path = expand_path(&rules.unwrap_or_else(|| config.paths.rules_file.clone()));
    let ruleset = RuleSet::load(&rules_path)?;
    tracing::info!(
        "Loaded {} classification rules from {}",
        ruleset.len(),
        rules_path.display()
    );

    let (events, ingest_stats) = tracebom::ingest::read_log(&log_file)?;
    tracing::info!(
        "Ingested {} events from {} ({} lines skipped)",
        events.len(),
        log_file.display(),
        ingest_stats.skipped_lines
    );

    let correlator = Correlator::new()?;
    let (groups, stats) = correlator.correlate(events)?;
    tracing::info!(
        "Correlated {} operation groups in {}ms",
        stats.grouped_records,
        stats.processing_time_ms
    );

    let cbom = Assembler::new(&ruleset).assemble(&groups);
    let output_path = expand_path(&output.unwrap_or_else(|| config.paths.output_file.clone()));
    cbom.save(&output_path)?;

    println!("✓ CBOM written to: {}", output_path.display());
    println!("  Components: {}", cbom.components.len());

    Ok(())
}

fn cmd_compare(
    config_path: Option<PathBuf>,
    candidate: PathBuf,
    reference: PathBuf,
    threshold: Option<f64>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let threshold = threshold.unwrap_or(config.matching.threshold);

    let candidate_cbom = Cbom::load(&candidate)?;
    let reference_cbom = Cbom::load(&reference)?;

    let report = Matcher::new(threshold).match_inventories(&reference_cbom, &candidate_cbom);

    if json {
        let text =
            serde_json::to_string_pretty(&report).map_err(|source| TracebomError::Json {
                source,
                context: "Failed to serialize match report".to_string(),
            })?;
        println!("{text}");
    } else {
        print_match_report(&report, threshold);
    }

    Ok(())
}

fn print_match_report(report: &MatchReport, threshold: f64) {
    println!("Match results (threshold {:.0}%)", threshold * 100.0);
    println!("=================================");

    if report.matches.is_empty() {
        println!("\nNo asset pairs to report");
    } else {
        println!();
        for entry in &report.matches {
            match &entry.target_id {
                Some(target) => println!(
                    "  {} -> {} ({:.1}%)",
                    entry.reference_id,
                    target,
                    entry.similarity * 100.0
                ),
                None => println!(
                    "  {} -> unmatched ({:.1}%, {})",
                    entry.reference_id,
                    entry.similarity * 100.0,
                    entry.note.as_deref().unwrap_or("below threshold")
                ),
            }
        }
    }

    println!(
        "\nConfirmed: {}  Missed: {}  Spurious: {}",
        report.confirmed, report.missed, report.spurious
    );
    println!(
        "Precision: {:.1}%  Recall: {:.1}%  F1: {:.1}%",
        report.precision * 100.0,
        report.recall * 100.0,
        report.f1 * 100.0
    );
}

fn cmd_run_target(
    config_path: Option<PathBuf>,
    script: Option<PathBuf>,
    log_file: Option<PathBuf>,
    command: Vec<String>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let script = script_path(&config, script);
    let log_file = log_file_path(&config, log_file);

    println!("✓ Tracing target: {}", command.join(" "));
    build_tracer(&config).trace_command(&script, &log_file, &command)?;

    println!("✓ Trace complete: {}", log_file.display());
    println!("  Next: tracebom parse-log {}", log_file.display());
    Ok(())
}

fn cmd_attach_pid(
    config_path: Option<PathBuf>,
    pid: i32,
    script: Option<PathBuf>,
    log_file: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let script = script_path(&config, script);
    let log_file = log_file_path(&config, log_file);

    println!("✓ Attaching to PID {pid}");
    build_tracer(&config).attach_pid(&script, &log_file, pid)?;

    println!("✓ Trace complete: {}", log_file.display());
    println!("  Next: tracebom parse-log {}", log_file.display());
    Ok(())
}

fn cmd_global_trace(
    config_path: Option<PathBuf>,
    script: Option<PathBuf>,
    log_file: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let script = script_path(&config, script);
    let log_file = log_file_path(&config, log_file);

    println!("✓ Tracing system-wide, stop with Ctrl-C");
    build_tracer(&config).global_trace(&script, &log_file)?;

    println!("✓ Trace complete: {}", log_file.display());
    println!("  Next: tracebom parse-log {}", log_file.display());
    Ok(())
}

fn build_tracer(config: &Config) -> Tracer {
    Tracer::new(expand_path(&config.tracer.binary), config.tracer.use_sudo)
}

fn script_path(config: &Config, script: Option<PathBuf>) -> PathBuf {
    expand_path(&script.unwrap_or_else(|| config.tracer.script.clone()))
}

fn log_file_path(config: &Config, log_file: Option<PathBuf>) -> PathBuf {
    expand_path(&log_file.unwrap_or_else(|| config.paths.log_file.clone()))
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| TracebomError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TracebomError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            // Save default config
            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());

            let config_dir = Config::config_dir()?;
            install_templates(&config_dir, force)?;

            println!("✓ Default templates installed");
            println!("  - rules.yaml: Classification rules");
            println!("  - probes.bt: OpenSSL probe script");
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'tracebom config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn install_templates(config_dir: &Path, force: bool) -> Result<()> {
    let rules_path = config_dir.join("rules.yaml");
    let probes_path = config_dir.join("probes.bt");

    // Prefer the repository's template directory when running from a
    // checkout.
    if let Ok(root) = std::env::current_dir() {
        let template_dir = root.join("config-templates");

        if template_dir.exists() {
            if force || !rules_path.exists() {
                std::fs::copy(template_dir.join("rules.yaml"), &rules_path).ok();
            }
            if force || !probes_path.exists() {
                std::fs::copy(template_dir.join("probes.bt"), &probes_path).ok();
            }
            return Ok(());
        }
    }

    // Fallback: templates compiled into the binary
    if force || !rules_path.exists() {
        let rules_content = include_str!("../config-templates/rules.yaml");
        std::fs::write(&rules_path, rules_content).map_err(|e| TracebomError::Io {
            source: e,
            context: format!("Failed to write rules.yaml: {:?}", rules_path),
        })?;
    }

    if force || !probes_path.exists() {
        let probes_content = include_str!("../config-templates/probes.bt");
        std::fs::write(&probes_path, probes_content).map_err(|e| TracebomError::Io {
            source: e,
            context: format!("Failed to write probes.bt: {:?}", probes_path),
        })?;
    }

    Ok(())
}
