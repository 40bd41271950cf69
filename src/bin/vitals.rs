//! Vitals CLI - replay recorded provider data through the reconciliation engine
//!
//! Commands:
//! - snapshot: Reconcile an export into a health snapshot
//! - doctor: Run the diagnostic pass and print the report
//! - watch: Refresh periodically with the configured throttle
//! - guidance: Print the failure guidance table

use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vitals_sync::adapters::{ExportAdapter, HealthConnectAdapter, ReadingsAdapter};
use vitals_sync::clock::{Clock, FixedClock, SystemClock};
use vitals_sync::config::MAX_INTERVAL_SECS;
use vitals_sync::diagnostics::DiagnosticReport;
use vitals_sync::error::{FailureReason, ProviderError, VitalsError};
use vitals_sync::pipeline::{Fetch, HealthMonitor, RefreshOutcome};
use vitals_sync::replay::{ReplayProvider, StaticPermissions};
use vitals_sync::types::{Capability, HealthSnapshot, PermissionStatus};
use vitals_sync::{guidance, SyncConfig, VITALS_VERSION};

/// Vitals - reconcile health-provider readings into a snapshot
#[derive(Parser)]
#[command(name = "vitals")]
#[command(author = "Synheart AI Inc")]
#[command(version = VITALS_VERSION)]
#[command(about = "Reconcile health-provider readings", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile an export into a health snapshot
    Snapshot {
        #[command(flatten)]
        source: SourceArgs,

        /// Evaluate as of this instant (RFC 3339) instead of now
        #[arg(long)]
        now: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the diagnostic pass
    Doctor {
        #[command(flatten)]
        source: SourceArgs,

        /// Evaluate as of this instant (RFC 3339) instead of now
        #[arg(long)]
        now: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Refresh periodically
    Watch {
        #[command(flatten)]
        source: SourceArgs,

        /// Override the poll interval (seconds)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many ticks
        #[arg(long)]
        count: Option<u32>,
    },

    /// Print the failure guidance table
    Guidance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input format
    #[arg(long, default_value = "health-connect")]
    format: InputFormat,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Local day offset from UTC in minutes (defaults to the system offset)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Treat a runtime permission as denied
    #[arg(long, value_enum)]
    deny: Vec<CapabilityArg>,

    /// Simulate a provider that declines read access
    #[arg(long)]
    unauthorized: bool,

    /// Simulate a provider that is not installed
    #[arg(long)]
    unavailable: bool,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Health Connect record dump
    HealthConnect,
    /// Engine reading list
    Readings,
}

#[derive(Clone, Copy, ValueEnum)]
enum CapabilityArg {
    ActivityRecognition,
    Location,
    BodySensors,
}

impl From<CapabilityArg> for Capability {
    fn from(arg: CapabilityArg) -> Self {
        match arg {
            CapabilityArg::ActivityRecognition => Capability::ActivityRecognition,
            CapabilityArg::Location => Capability::Location,
            CapabilityArg::BodySensors => Capability::BodySensors,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), VitalsCliError> {
    match cli.command {
        Commands::Snapshot { source, now, json } => {
            let monitor = build_monitor(&source, now.as_deref())?;
            cmd_snapshot(&monitor, json).await
        }
        Commands::Doctor { source, now, json } => {
            let monitor = build_monitor(&source, now.as_deref())?;
            cmd_doctor(&monitor, json).await
        }
        Commands::Watch {
            source,
            interval,
            count,
        } => {
            let monitor = build_monitor(&source, None)?;
            cmd_watch(&monitor, interval, count).await
        }
        Commands::Guidance { json } => cmd_guidance(json),
    }
}

fn build_monitor(source: &SourceArgs, now: Option<&str>) -> Result<HealthMonitor, VitalsCliError> {
    let input = read_input(&source.input)?;
    let readings = match source.format {
        InputFormat::HealthConnect => HealthConnectAdapter.parse(&input)?,
        InputFormat::Readings => ReadingsAdapter.parse(&input)?,
    };
    tracing::info!(readings = readings.len(), "loaded export");

    let mut config = match &source.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig {
            utc_offset_minutes: Local::now().offset().local_minus_utc() / 60,
            ..Default::default()
        },
    };
    if let Some(offset) = source.utc_offset {
        config.utc_offset_minutes = offset;
    }

    let mut provider = ReplayProvider::new(readings);
    if source.unavailable {
        provider = provider.with_authorization(Err(ProviderError::Unavailable(
            "provider not installed".to_string(),
        )));
    } else if source.unauthorized {
        provider = provider.with_authorization(Ok(false));
    }

    let mut platform = StaticPermissions::granted();
    for capability in &source.deny {
        platform = platform.set((*capability).into(), PermissionStatus::Denied);
    }

    let clock: Arc<dyn Clock> = match now {
        Some(text) => Arc::new(FixedClock(parse_instant(text)?)),
        None => Arc::new(SystemClock),
    };

    Ok(HealthMonitor::new(
        Arc::new(provider),
        Arc::new(platform),
        clock,
        config,
    )?)
}

fn read_input(path: &Path) -> Result<String, VitalsCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, VitalsCliError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VitalsCliError::InvalidArgument(format!("--now {}: {}", text, e)))
}

fn wants_json(flag: bool) -> bool {
    flag || !atty::is(atty::Stream::Stdout)
}

async fn cmd_snapshot(monitor: &HealthMonitor, json: bool) -> Result<(), VitalsCliError> {
    let fetch = monitor.fetch().await;
    print_fetch(&fetch, wants_json(json))?;
    match fetch.result {
        Ok(_) => Ok(()),
        Err(reason) => Err(VitalsCliError::Failure(reason)),
    }
}

async fn cmd_doctor(monitor: &HealthMonitor, json: bool) -> Result<(), VitalsCliError> {
    let report = monitor.get_diagnostic_report().await;

    if wants_json(json) {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.success {
        Ok(())
    } else {
        Err(VitalsCliError::DoctorFailed)
    }
}

async fn cmd_watch(
    monitor: &HealthMonitor,
    interval: Option<u64>,
    count: Option<u32>,
) -> Result<(), VitalsCliError> {
    let secs = interval
        .unwrap_or(monitor.config().poll_interval_secs)
        .clamp(1, MAX_INTERVAL_SECS);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(secs));
    let json = wants_json(false);
    let mut ticks = 0u32;

    loop {
        ticker.tick().await;
        match monitor.refresh().await {
            RefreshOutcome::Completed(fetch) => print_fetch(&fetch, json)?,
            RefreshOutcome::SkippedThrottled { retry_in } => {
                tracing::info!(?retry_in, "refresh throttled")
            }
            RefreshOutcome::SkippedInProgress => tracing::info!("refresh still running"),
            RefreshOutcome::Discarded | RefreshOutcome::Inactive => break,
        }

        ticks += 1;
        if count.is_some_and(|limit| ticks >= limit) {
            break;
        }
    }

    monitor.shutdown();
    Ok(())
}

fn cmd_guidance(json: bool) -> Result<(), VitalsCliError> {
    let table = guidance::table();
    if wants_json(json) {
        let entries: Vec<_> = table
            .iter()
            .map(|(reason, text)| serde_json::json!({ "code": reason.code(), "guidance": text }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (reason, text) in &table {
            println!("{:<24} {}", reason.code(), text);
        }
    }
    Ok(())
}

// Output helpers

fn print_fetch(fetch: &Fetch, json: bool) -> Result<(), VitalsCliError> {
    if json {
        let value = match &fetch.result {
            Ok(snapshot) => serde_json::json!({ "snapshot": snapshot }),
            Err(reason) => serde_json::json!({
                "failure": { "code": reason.code(), "guidance": reason.guidance(), "reason": reason },
                "diagnostic": fetch.diagnostic,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match &fetch.result {
        Ok(snapshot) => print_snapshot(snapshot),
        Err(reason) => {
            println!("[{}] {}", reason.code(), reason.guidance());
            if let Some(report) = &fetch.diagnostic {
                println!();
                print_report(report);
            }
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &HealthSnapshot) {
    println!("Health Snapshot");
    println!("===============");
    for metric in snapshot.iter() {
        match (metric.value(), metric.observed_at()) {
            (Some(value), Some(at)) => {
                let detail = metric
                    .detail()
                    .map(|d| format!(" ({})", d.activity))
                    .unwrap_or_default();
                println!(
                    "  {:<16} {:>10.1}{}  @ {}",
                    metric.kind().as_str(),
                    value,
                    detail,
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                );
            }
            _ => println!("  {:<16} {:>10}", metric.kind().as_str(), "-"),
        }
    }
}

fn print_report(report: &DiagnosticReport) {
    println!("Vitals Doctor Report");
    println!("====================");
    println!("Report:  {}", report.report_id);
    println!("Success: {}", report.success);
    println!(
        "Permissions: runtime={} authorized={} available={}",
        report.permission_state.runtime_granted,
        report.permission_state.provider_authorized,
        report.permission_state.provider_available
    );

    println!("\nWindows:");
    for attempt in &report.windows_tried {
        let points = attempt
            .point_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "failed".to_string());
        println!("  {:>4}: {}", attempt.window.label(), points);
    }

    println!("\nObservations:");
    for line in &report.observations {
        println!("  - {}", line);
    }

    if !report.errors.is_empty() {
        println!("\nErrors:");
        for line in &report.errors {
            println!("  [ERR] {}", line);
        }
    }
}

// Error types

#[derive(Debug)]
enum VitalsCliError {
    Io(io::Error),
    Vitals(VitalsError),
    Json(serde_json::Error),
    InvalidArgument(String),
    Failure(FailureReason),
    DoctorFailed,
}

impl From<io::Error> for VitalsCliError {
    fn from(e: io::Error) -> Self {
        VitalsCliError::Io(e)
    }
}

impl From<VitalsError> for VitalsCliError {
    fn from(e: VitalsError) -> Self {
        VitalsCliError::Vitals(e)
    }
}

impl From<serde_json::Error> for VitalsCliError {
    fn from(e: serde_json::Error) -> Self {
        VitalsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VitalsCliError> for CliError {
    fn from(e: VitalsCliError) -> Self {
        match e {
            VitalsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VitalsCliError::Vitals(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the input format and configuration file".to_string()),
            },
            VitalsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            VitalsCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Timestamps must be RFC 3339, e.g. 2024-01-15T18:00:00Z".to_string()),
            },
            VitalsCliError::Failure(reason) => CliError {
                code: reason.code().to_string(),
                message: reason.to_string(),
                hint: Some(reason.guidance()),
            },
            VitalsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "Diagnostic pass did not find usable data".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
