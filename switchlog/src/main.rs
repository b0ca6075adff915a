//! Switchlog CLI
//!
//! ```bash
//! # Parse a captured session and store a snapshot for the device
//! switchlog collect captures/sw1.log
//!
//! # Compare the latest snapshot against the oldest one kept
//! switchlog report sw1 --baseline oldest --format json
//!
//! # List stored snapshots
//! switchlog history sw1
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::error;

use switchlog::config::{DEFAULT_HISTORY_DIR, RunConfig};
use switchlog::history::{Baseline, DEFAULT_MAX_KEEP};
use switchlog::template::DEFAULT_PLATFORM;
use switchlog::{Capture, HistoryStore, Pipeline, Report, RunStats};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "switchlog")]
#[command(about = "Track switch STP and EtherChannel state across collection runs", long_about = None)]
struct Cli {
    /// Directory holding per-device history files
    #[arg(long, global = true, env = "SWITCHLOG_HISTORY", default_value = DEFAULT_HISTORY_DIR)]
    history_dir: PathBuf,

    /// ntc-templates style directory layered over the built-in templates
    #[arg(long, global = true, env = "NET_TEXTFSM")]
    templates_dir: Option<PathBuf>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a captured CLI session and store a snapshot
    Collect(CollectArgs),
    /// Compare a device's latest snapshot with its baseline
    Report(ReportArgs),
    /// List a device's stored snapshots
    History(HistoryArgs),
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Session transcript (prompt + command lines followed by output)
    capture: PathBuf,

    /// Device id (default: hostname from the prompt)
    #[arg(long)]
    device: Option<String>,

    /// Platform used for template selection
    #[arg(long, default_value = DEFAULT_PLATFORM)]
    platform: String,

    /// Collection time in RFC 3339 (default: now)
    #[arg(long)]
    timestamp: Option<DateTime<Utc>>,

    /// Snapshots kept per device; 0 keeps all
    #[arg(long, default_value_t = DEFAULT_MAX_KEEP)]
    keep: usize,

    #[arg(long, default_value_t = Baseline::Previous)]
    baseline: Baseline,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Args)]
struct ReportArgs {
    device: String,

    #[arg(long, default_value_t = Baseline::Previous)]
    baseline: Baseline,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    device: String,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let result = match &cli.command {
        Commands::Collect(args) => collect(&cli, args),
        Commands::Report(args) => report(&cli, args),
        Commands::History(args) => history(&cli, args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn config(cli: &Cli) -> switchlog::config::RunConfigBuilder {
    let builder = RunConfig::builder().history_dir(&cli.history_dir);
    match &cli.templates_dir {
        Some(dir) => builder.templates_dir(dir),
        None => builder,
    }
}

fn collect(cli: &Cli, args: &CollectArgs) -> CliResult {
    let mut builder = config(cli)
        .platform(&args.platform)
        .max_keep((args.keep > 0).then_some(args.keep))
        .baseline(args.baseline);
    if let Some(device) = &args.device {
        builder = builder.device_id(device);
    }
    if let Some(timestamp) = args.timestamp {
        builder = builder.timestamp(timestamp);
    }
    let config = builder.build();

    let capture = Capture::from_file(&args.capture, config.platform())?;
    let device_id = config.device_id().unwrap_or(capture.hostname()).to_string();

    let pipeline = Pipeline::new(config.matcher()?);
    let mut store = HistoryStore::open(config.persistence())?;
    let stats = pipeline.record(&mut store, &device_id, config.timestamp(), capture.blocks())?;

    {
        let report = Report::from_store(&store, &device_id, config.baseline())?;
        match args.format {
            Format::Text => {
                print_stats(&stats);
                print!("{}", report);
            }
            Format::Json => {
                let out = serde_json::json!({ "run": stats, "report": report });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
    }

    store.close()?;
    Ok(())
}

fn report(cli: &Cli, args: &ReportArgs) -> CliResult {
    let config = config(cli).baseline(args.baseline).build();
    let store = HistoryStore::open(config.persistence())?;
    let report = Report::from_store(&store, &args.device, config.baseline())?;

    match args.format {
        Format::Text => print!("{}", report),
        Format::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn history(cli: &Cli, args: &HistoryArgs) -> CliResult {
    let config = config(cli).build();
    let store = HistoryStore::open(config.persistence())?;
    let snapshots = store.all(&args.device);

    match args.format {
        Format::Text => {
            if snapshots.is_empty() {
                println!("No snapshots stored for {}", args.device);
            }
            for snapshot in snapshots {
                let s = snapshot.summary();
                println!(
                    "{}  {} STP port(s), {} blocking, {} group(s), {} member(s)",
                    snapshot.timestamp().to_rfc3339(),
                    s.stp_ports,
                    s.blocking,
                    s.groups,
                    s.group_members
                );
            }
        }
        Format::Json => {
            let all: Vec<_> = snapshots.iter().collect();
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
    }
    Ok(())
}

fn print_stats(stats: &RunStats) {
    println!(
        "Parsed {} command(s): {} ignored, {} failed; {} record(s), {} skipped, {} duplicate(s), {} conflict(s)",
        stats.commands,
        stats.commands_ignored,
        stats.commands_failed,
        stats.records,
        stats.records_skipped,
        stats.duplicates,
        stats.conflicts
    );
    for outcome in stats.outcomes.iter().filter(|o| !o.is_success()) {
        if let Some(message) = &outcome.failure_message {
            println!("  {}: {}", outcome.command, message);
        }
    }
}
