//! Taranaki hydrology dashboard service.
//!
//! Serves the dashboard API, or runs one engine operation from the command
//! line and prints the result as JSON (or CSV for `dataset --out`).
//!
//! Usage:
//!   hydromon_service serve --port 8080
//!   hydromon_service snapshot "River Flow (m³/s)"
//!   hydromon_service markers "Hourly Rainfall (mm)" --period 24hrs
//!   hydromon_service summary "Hourly Rainfall (mm)" --period 1week
//!   hydromon_service series "River Flow (m³/s)" "Patea at Skinner Rd" --days 2
//!   hydromon_service dataset "River Stage (m)" "Patea at Skinner Rd" --from 2025-07-01 --out .
//!
//! Environment:
//!   HYDROMON_CONFIG   - configuration file (default: hydromon.toml, else built-in)
//!   HILLTOP_BASE_URL  - overrides [provider] base_url
//!   HILLTOP_HTS_FILE  - overrides [provider] hts_file
//!   RUST_LOG          - overrides -v

use chrono::{Duration, Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use hydromon_service::catalog::{CatalogHealth, TimePeriod};
use hydromon_service::config::{load_from_env, ServiceConfig, MAX_QUERY_DAYS};
use hydromon_service::endpoint::{start_endpoint_server, AppState};
use hydromon_service::engine::Engine;
use hydromon_service::export::{export_filename, write_dataset_csv, write_dataset_file};
use hydromon_service::ingest::hilltop::{parse_timestamp, HilltopClient};
use hydromon_service::logging;
use hydromon_service::model::QueryError;

#[derive(Debug, Parser)]
#[command(name = "hydromon_service", version, about = "Taranaki hydrology dashboard service")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the dashboard API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// List configured measurements
    Measurements,
    /// Latest reading per site
    Snapshot { label: String },
    /// Classified map markers, latest or over a period
    Markers {
        label: String,
        #[arg(long)]
        period: Option<TimePeriod>,
    },
    /// Per-site values over a period
    Summary {
        label: String,
        /// latest, 24hrs, 48hrs, 72hrs, 1week or 1month
        #[arg(long)]
        period: Option<TimePeriod>,
    },
    /// One site's series over the last few days
    Series {
        label: String,
        site: String,
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(i64).range(1..=MAX_QUERY_DAYS))]
        days: i64,
    },
    /// Multi-site export
    Dataset {
        label: String,
        #[arg(required = true)]
        sites: Vec<String>,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: Option<String>,
        /// Write CSV into this directory (or file) instead of printing JSON
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match load_from_env(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, engine, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn build_engine(config: &ServiceConfig) -> Result<Engine, String> {
    let client = HilltopClient::new(&config.provider)
        .map_err(|e| format!("Failed to create Hilltop client: {}", e))?;
    let engine = Engine::from_config(config, Arc::new(client))
        .map_err(|e| format!("Configuration error: {}", e))?;

    match engine.catalog().health() {
        CatalogHealth::Live => info!(
            measurements = engine.catalog().labels().len(),
            "catalog loaded"
        ),
        CatalogHealth::Degraded { reason } => {
            warn!(reason = %reason, "running with fallback catalog")
        }
    }
    Ok(engine)
}

fn run(command: Command, engine: Engine, config: &ServiceConfig) -> Result<(), String> {
    let now = Local::now().naive_local();

    match command {
        Command::Serve { port, workers } => {
            let state = Arc::new(AppState::new(engine, config));
            start_endpoint_server(port, state, workers).map_err(|e| e.to_string())
        }
        Command::Measurements => {
            let labels = engine.catalog().labels();
            print_json(&labels)
        }
        Command::Snapshot { label } => {
            let snapshot = engine.latest_snapshot(&label).map_err(describe)?;
            print_json(&snapshot)
        }
        Command::Summary { label, period } => {
            let def = engine.catalog().resolve(&label).map_err(describe)?;
            let period = period.unwrap_or_else(|| TimePeriod::default_for(def.cumulative));
            let summary = engine.period_summary(&label, period).map_err(describe)?;
            print_json(&summary)
        }
        Command::Markers { label, period } => {
            let markers = match period {
                Some(period) => engine.period_markers(&label, period),
                None => engine.map_markers(&label),
            }
            .map_err(describe)?;
            print_json(&markers)
        }
        Command::Series { label, site, days } => {
            let cumulative = engine.catalog().resolve(&label).map_err(describe)?.cumulative;
            let series = engine
                .series_for(&label, &site, now - Duration::days(days), now, cumulative)
                .map_err(describe)?;
            print_json(&series)
        }
        Command::Dataset {
            label,
            sites,
            from,
            to,
            out,
        } => {
            let from = cli_time(&from)?;
            let to = match to {
                Some(t) => cli_time(&t)?,
                None => now,
            };
            if to.signed_duration_since(from) > Duration::days(config.provider.max_query_days) {
                return Err(format!(
                    "Window is longer than {} days",
                    config.provider.max_query_days
                ));
            }
            let dataset = engine.dataset_for(&label, &sites, from, to).map_err(describe)?;
            if !dataset.missing_sites.is_empty() {
                warn!(missing = ?dataset.missing_sites, "some sites returned no data");
            }

            match out {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(export_filename(&label))
                    } else {
                        path
                    };
                    write_dataset_file(&dataset, &path).map_err(|e| e.to_string())?;
                    println!("{}", path.display());
                    Ok(())
                }
                None => write_dataset_csv(&dataset, std::io::stdout()).map_err(|e| e.to_string()),
            }
        }
    }
}

fn cli_time(text: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(text).ok_or_else(|| format!("Invalid timestamp: {}", text))
}

/// User-facing text; the detail is already in the logs.
fn describe(err: QueryError) -> String {
    info!(error = %err, "query failed");
    err.user_message().to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
