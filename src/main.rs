//! Waypoint - Mission & Directive Progression Engine
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use waypoint::cli::TransitionOutput;
use waypoint::config::{crash_log_path, ledger_path, Config};
use waypoint::core::Variant;
use waypoint::error::exit_codes;
use waypoint::{Engine, FileUnitStore, Ledger};

// =============================================================================
// CLI Definition
// =============================================================================

/// Waypoint - Mission & Directive Progression Engine
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a generated unit from a JSON file
    Import {
        /// Path to the unit JSON
        file: PathBuf,
        /// Variant to import as (defaults to the file's own)
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
        /// Report category
        #[arg(long)]
        category: Option<String>,
        /// Declared location
        #[arg(long)]
        location: Option<String>,
        /// Approach the user picked
        #[arg(long)]
        approach: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show a unit's progress
    Status {
        /// Unit ID
        unit_id: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// List stored units
    List {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
        /// Maximum number of units
        #[arg(long, short)]
        limit: Option<usize>,
        /// Hide completed units
        #[arg(long)]
        active_only: bool,
    },

    /// Complete a step
    Complete {
        /// Unit ID
        unit_id: String,
        /// Phase index of the step
        #[arg(long)]
        phase: usize,
        /// Step ID
        #[arg(long)]
        step: String,
        /// Gate answer as gate=value (repeatable)
        #[arg(long = "answer", short = 'a')]
        answers: Vec<String>,
        /// Evidence reference (media URI or content id)
        #[arg(long)]
        evidence: Option<String>,
        /// Refuse unless the unit is at this version
        #[arg(long)]
        expected_version: Option<u64>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Move the review cursor to an unlocked phase
    Jump {
        /// Unit ID
        unit_id: String,
        /// Target phase index
        index: usize,
        /// Refuse unless the unit is at this version
        #[arg(long)]
        expected_version: Option<u64>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Retry a deferred audit digest
    Audit {
        /// Unit ID
        unit_id: String,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show a unit's progress ledger
    Ledger {
        /// Unit ID
        unit_id: String,
        /// Show only the most recent entries
        #[arg(long, short)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    Mission,
    Directive,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Mission => Variant::Mission,
            VariantArg::Directive => Variant::Directive,
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("waypoint error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.waypoint/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("waypoint panic: {}", info);

        if let Some(crash_log) = crash_log_path() {
            if let Some(parent) = crash_log.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Install the stderr log subscriber.
///
/// `--verbose` forces debug; otherwise `WAYPOINT_LOG`, then `RUST_LOG`, then warn.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("WAYPOINT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .try_init();
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Import {
            file,
            variant,
            category,
            location,
            approach,
            json,
            quiet,
        } => {
            use waypoint::cli::import::{ImportCommand, ImportOptions};

            let cmd = ImportCommand::new(open_engine(&cwd)?);
            let options = ImportOptions {
                json,
                quiet,
                variant: variant.map(Variant::from),
                category,
                location,
                approach,
            };
            let output = cmd.run(&file, &options);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(success_to_exit_code(output.success))
        }
        Commands::Status {
            unit_id,
            json,
            quiet,
        } => {
            use waypoint::cli::status::{StatusCommand, StatusOptions};

            let cmd = StatusCommand::new(open_engine(&cwd)?);
            let options = StatusOptions { json, quiet };
            let output = cmd.run(&unit_id);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(success_to_exit_code(output.success))
        }
        Commands::List {
            json,
            quiet,
            limit,
            active_only,
        } => {
            use waypoint::cli::list::{ListCommand, ListOptions};

            let cmd = ListCommand::new(open_engine(&cwd)?);
            let options = ListOptions {
                json,
                quiet,
                limit,
                active_only,
            };
            let output = cmd.run(&options);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(success_to_exit_code(output.success))
        }
        Commands::Complete {
            unit_id,
            phase,
            step,
            answers,
            evidence,
            expected_version,
            json,
            quiet,
        } => {
            use waypoint::cli::complete::{CompleteCommand, CompleteOptions};

            let cmd = CompleteCommand::new(open_engine(&cwd)?);
            let options = CompleteOptions {
                json,
                quiet,
                phase,
                step,
                answers,
                evidence,
                expected_version,
            };
            let output = cmd.run(&unit_id, &options);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(transition_exit_code(&output))
        }
        Commands::Jump {
            unit_id,
            index,
            expected_version,
            json,
            quiet,
        } => {
            use waypoint::cli::jump::{JumpCommand, JumpOptions};

            let cmd = JumpCommand::new(open_engine(&cwd)?);
            let options = JumpOptions {
                json,
                quiet,
                expected_version,
            };
            let output = cmd.run(&unit_id, index, &options);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(transition_exit_code(&output))
        }
        Commands::Audit {
            unit_id,
            json,
            quiet,
        } => {
            use waypoint::cli::audit::{AuditCommand, AuditOptions};

            let cmd = AuditCommand::new(open_engine(&cwd)?);
            let options = AuditOptions { json, quiet };
            let output = cmd.run(&unit_id);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(success_to_exit_code(output.success))
        }
        Commands::Ledger {
            unit_id,
            limit,
            json,
            quiet,
        } => {
            use waypoint::cli::ledger::{LedgerCommand, LedgerOptions};

            let cmd = LedgerCommand::new(open_engine(&cwd)?);
            let options = LedgerOptions { json, quiet, limit };
            let output = cmd.run(&unit_id, &options);
            print_formatted(&cmd.format_output(&output, &options));
            Ok(success_to_exit_code(output.success))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Build the engine over the file store, with project-aware config and the
/// home ledger.
fn open_engine(cwd: &Path) -> Result<Engine<FileUnitStore>, Box<dyn std::error::Error>> {
    let config = Config::load_from_cwd(cwd);
    let store = FileUnitStore::new()?;
    let mut engine = Engine::new(store).with_config(config);
    if let Some(path) = ledger_path() {
        engine = engine.with_ledger(Ledger::new(path));
    }
    Ok(engine)
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        print!("{}", formatted);
        if !formatted.ends_with('\n') {
            println!();
        }
    }
}

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

/// Refusals exit with `REFUSED` so scripts can re-prompt instead of abort.
fn transition_exit_code(output: &TransitionOutput) -> ExitCode {
    if output.refused {
        ExitCode::from(exit_codes::REFUSED as u8)
    } else {
        success_to_exit_code(output.success)
    }
}

// =============================================================================
// Tests
// =============================================================================
