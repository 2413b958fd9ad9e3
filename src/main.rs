use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use scantrack::db::Database;
use scantrack::events::{EventSink, JsonlEventSink, NullEventSink};
use scantrack::ingest::{IngestOutcome, Ingestor, ScanSnapshot};
use scantrack::scheduler::runner::ProcessScanRunner;
use scantrack::scheduler::{RunOutcome, Scheduler};
use scantrack::{logging, Config};

enum Mode {
    /// Run the scheduler until interrupted.
    Daemon,
    /// Trigger a single scan run and exit.
    Once,
    /// Ingest a snapshot JSON file (`-` for stdin) and exit.
    Ingest(PathBuf),
}

struct Args {
    config_path: Option<PathBuf>,
    mode: Mode,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut mode = Mode::Daemon;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("scantrack {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--once" | "-1" => {
                mode = Mode::Once;
            }
            "--ingest" => {
                if i + 1 < args.len() {
                    mode = Mode::Ingest(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --ingest requires a file argument ('-' for stdin)");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { config_path, mode }
}

fn print_help() {
    println!(
        r#"scantrack - filesystem scan history daemon

USAGE:
    scantrack [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --once, -1          Run a single scan and exit
    --ingest FILE       Ingest a scan snapshot JSON file ('-' for stdin) and exit
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SCANTRACK_LOG       Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/scantrack/config.toml"#
    );
}

fn read_snapshot(path: &PathBuf) -> Result<ScanSnapshot> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read snapshot from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot file {}", path.display()))?
    };
    serde_json::from_str(&content).context("failed to parse snapshot JSON")
}

fn event_sink(config: &Config) -> Arc<dyn EventSink> {
    match JsonlEventSink::new(&config.event_log_dir) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!("Event log unavailable ({}), events will be dropped", e);
            Arc::new(NullEventSink)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(None);

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    db.initialize()?;

    let events = event_sink(&config);

    if let Mode::Ingest(path) = &args.mode {
        let snapshot = read_snapshot(path)?;
        let ingestor = Ingestor::new(db, events, config.ingest.skip_empty_scans);
        match ingestor.create_scan(&snapshot)? {
            IngestOutcome::Stored {
                scan_id,
                files_processed,
            } => println!("Stored scan {scan_id} with {files_processed} file change(s)"),
            IngestOutcome::Skipped {
                reason,
                files_tracked,
            } => println!("Skipped scan ({reason}), {files_tracked} file(s) tracked"),
        }
        return Ok(());
    }

    let runner = Arc::new(ProcessScanRunner::new(
        config.scheduler.command.clone(),
        config.scheduler.args.clone(),
        config.scheduler.working_dir.clone(),
    ));
    let scheduler = Scheduler::new(
        runner,
        events,
        Duration::from_millis(config.scheduler.scan_interval_ms),
    );

    if matches!(args.mode, Mode::Once) {
        match scheduler.run_now().await {
            RunOutcome::Completed {
                duration_ms,
                changes,
            } => {
                println!("Scan completed in {duration_ms}ms, {changes} file(s) with changes");
                return Ok(());
            }
            RunOutcome::Failed { duration_ms, error } => {
                anyhow::bail!("scan failed after {duration_ms}ms: {error}");
            }
            RunOutcome::Skipped { reason } => {
                anyhow::bail!("scan skipped: {reason}");
            }
        }
    }

    if config.scheduler.auto_start {
        scheduler.start();
    } else {
        info!("Scheduler auto-start disabled, waiting for shutdown signal");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.stop();

    Ok(())
}
