//! GPS Tracker - position ingestion, mileage reports and KML export.
//!
//! Run with: `cargo run -p tracker-service -- ingest`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracker_core::TrackingClient;
use tracker_service::config::default_config_path;
use tracker_service::location::last_location;
use tracker_service::{
    Config, Exporter, IngestOptions, MileageAggregator, Pipeline, RunOutcome, Scheduler, Settings,
};
use tracker_store::{Dsn, PositionQuery, Store};
use tracker_types::DayTag;

#[derive(Parser, Debug)]
#[command(name = "gps-tracker")]
#[command(author, version, about = "GPS position ingestion, mileage reports and KML export", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store DSN, host[:port]|user|password|database (overrides config)
    #[arg(long, global = true)]
    dsn: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull new positions from the tracking service once
    Ingest,

    /// Ingest repeatedly until interrupted
    Run {
        /// Seconds between runs (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Export tracks after each run that stored new positions
        #[arg(long)]
        export: bool,
    },

    /// Show miles done today and to date
    Miles {
        /// Show the miles of one day (YYYYMMDD) instead
        #[arg(short, long)]
        tag: Option<DayTag>,
    },

    /// Show the most recent recorded position
    LastLocation,

    /// Write tracks as KML files
    Export {
        /// Output directory (overrides config)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Export only this day (YYYYMMDD)
        #[arg(short, long)]
        tag: Option<DayTag>,
    },

    /// Record the settled mileage of a completed day
    Settle {
        /// Day to settle (YYYYMMDD)
        tag: DayTag,

        /// Miles to record (defaults to the day's tracked distance)
        #[arg(short, long)]
        miles: Option<f64>,
    },

    /// List stored tracks
    Tracks,

    /// List stored positions
    Positions {
        /// Only this day (YYYYMMDD)
        #[arg(short, long)]
        tag: Option<DayTag>,

        /// Only this device
        #[arg(short, long)]
        device: Option<String>,

        /// Only fixes at or after this unix timestamp
        #[arg(long)]
        since: Option<i64>,

        /// Only fixes at or before this unix timestamp
        #[arg(long)]
        until: Option<i64>,

        /// Maximum number of positions
        #[arg(short = 'n', long, default_value = "50")]
        limit: u32,

        /// Skip this many positions
        #[arg(long)]
        offset: Option<u32>,

        /// Oldest first
        #[arg(long)]
        oldest_first: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(dsn) = &cli.dsn {
        config.storage.dsn = dsn.clone();
    }

    if let Commands::Config { action } = &cli.command {
        return handle_config(action, &config, &config_path, cli.json);
    }

    let settings = config.resolve()?;
    let store = Store::connect(&settings.dsn)
        .with_context(|| format!("Failed to open store {}", settings.dsn))?
        .with_lock_lease(settings.lock.lease);

    match cli.command {
        Commands::Ingest => cmd_ingest(&store, &config, &settings, cli.json).await,
        Commands::Run { interval, export } => {
            cmd_run(&store, &config, &settings, interval, export, cli.json).await
        }
        Commands::Miles { tag } => cmd_miles(&store, &settings, tag, cli.json),
        Commands::LastLocation => cmd_last_location(&store, &settings, cli.json),
        Commands::Export { dir, tag } => cmd_export(&store, &settings, dir, tag, cli.json),
        Commands::Settle { tag, miles } => cmd_settle(&store, &settings, tag, miles, cli.json),
        Commands::Tracks => cmd_tracks(&store, cli.json),
        Commands::Positions {
            tag,
            device,
            since,
            until,
            limit,
            offset,
            oldest_first,
        } => {
            let mut query = PositionQuery::new().limit(limit);
            if let Some(tag) = tag {
                query = query.tag(tag);
            }
            if let Some(device) = device {
                query = query.device(&device);
            }
            if let Some(since) = since {
                query = query.since(since);
            }
            if let Some(until) = until {
                query = query.until(until);
            }
            if let Some(offset) = offset {
                query = query.offset(offset);
            }
            if oldest_first {
                query = query.oldest_first();
            }
            cmd_positions(&store, &query, cli.json)
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn tracking_client(config: &Config) -> anyhow::Result<TrackingClient> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.source.timeout_secs))
        .build()?;
    Ok(TrackingClient::with_client(
        &config.source.base_url,
        &config.source.api_key,
        http,
    )?)
}

async fn cmd_ingest(
    store: &Store,
    config: &Config,
    settings: &Settings,
    json: bool,
) -> anyhow::Result<()> {
    let client = tracking_client(config)?;
    let pipeline = Pipeline::new(store, &client, IngestOptions::from_settings(settings));
    let outcome = pipeline.run().await?;

    if json {
        return print_json(&outcome);
    }

    match outcome {
        RunOutcome::NotStarted => println!("Start date not reached yet"),
        RunOutcome::Skipped => println!("Another ingestion run is in progress, skipped"),
        RunOutcome::Empty => println!("No new positions"),
        RunOutcome::Ingested(report) => {
            println!(
                "Stored {} new of {} fetched positions ({:.3} km)",
                report.inserted, report.fetched, report.distance_km
            );
            if report.stalled {
                println!("No progress past {}: raise source.batch_size", report.since);
            }
        }
    }
    Ok(())
}

async fn cmd_run(
    store: &Store,
    config: &Config,
    settings: &Settings,
    interval: Option<u64>,
    export: bool,
    json: bool,
) -> anyhow::Result<()> {
    let period = interval.map_or(settings.run_interval, Duration::from_secs);
    if period.is_zero() {
        bail!("interval must be at least 1 second");
    }

    let client = tracking_client(config)?;
    let pipeline = Pipeline::new(store, &client, IngestOptions::from_settings(settings));
    let mut scheduler = Scheduler::new(pipeline, period);
    if export {
        scheduler = scheduler.with_exporter(Exporter::new(
            store,
            &settings.export_dir,
            settings.utc_offset,
        ));
    }

    let stats = scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl-C, shutting down");
        })
        .await;

    if json {
        return print_json(&stats);
    }
    println!(
        "{} run(s), {} failed, {} skipped, {} new positions",
        stats.runs, stats.failures, stats.skipped, stats.inserted
    );
    Ok(())
}

fn cmd_miles(
    store: &Store,
    settings: &Settings,
    tag: Option<DayTag>,
    json: bool,
) -> anyhow::Result<()> {
    let aggregator = MileageAggregator::new(store, settings.units.km_to_miles, settings.utc_offset);

    if let Some(tag) = tag {
        let miles = aggregator.miles_for_tag(&tag)?;
        if json {
            return print_json(&serde_json::json!({ "tag": tag, "miles": miles }));
        }
        println!("{}: {} mi", tag, miles);
        return Ok(());
    }

    let today = DayTag::today(settings.utc_offset);
    let todays = aggregator.miles_for_tag(&today)?;
    let total = aggregator.total_miles_as_of(&today)?;

    if json {
        return print_json(&serde_json::json!({
            "today": today,
            "todays_miles": todays,
            "total_miles": total,
        }));
    }
    println!("Today ({}): {} mi", today, todays);
    println!("Total:           {} mi", total);
    Ok(())
}

fn cmd_last_location(store: &Store, settings: &Settings, json: bool) -> anyhow::Result<()> {
    let report = last_location(
        store,
        settings.start_timestamp,
        &settings.units,
        settings.utc_offset,
    )?;

    if json {
        return print_json(&report);
    }

    match report {
        None => println!("No position recorded since the start date"),
        Some(location) => {
            println!("Device:    {}", location.device_key);
            println!("Time:      {}", location.recorded_at.format(&Rfc3339)?);
            println!(
                "Position:  {}, {}",
                location.coordinate.latitude, location.coordinate.longitude
            );
            println!("Altitude:  {} ft", location.altitude_ft);
            println!("Speed:     {} mph", location.speed_mph);
            println!("Heading:   {}", location.heading);
            println!("Today:     {} mi", location.todays_miles);
        }
    }
    Ok(())
}

fn cmd_export(
    store: &Store,
    settings: &Settings,
    dir: Option<PathBuf>,
    tag: Option<DayTag>,
    json: bool,
) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| settings.export_dir.clone());
    let exporter = Exporter::new(store, dir, settings.utc_offset);

    if let Some(tag) = tag {
        let path = exporter.export_tag(&tag)?;
        if json {
            return print_json(&serde_json::json!({ "written": [path] }));
        }
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let summary = exporter.export_all()?;
    if json {
        return print_json(&summary);
    }
    for path in &summary.written {
        println!("Wrote {}", path.display());
    }
    if !summary.skipped.is_empty() {
        println!("{} completed track(s) already exported", summary.skipped.len());
    }
    Ok(())
}

fn cmd_settle(
    store: &Store,
    settings: &Settings,
    tag: DayTag,
    miles: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(miles) = miles
        && !(miles.is_finite() && miles >= 0.0)
    {
        bail!("mileage must be a non-negative number, got {}", miles);
    }

    let aggregator = MileageAggregator::new(store, settings.units.km_to_miles, settings.utc_offset);
    let settlement = aggregator.settle(&tag, miles)?;
    if !settlement.recorded {
        bail!("Stage {} is already settled", tag);
    }

    if json {
        return print_json(&settlement);
    }
    println!("Settled {} at {:.2} mi", settlement.tag, settlement.mileage);
    Ok(())
}

fn cmd_tracks(store: &Store, json: bool) -> anyhow::Result<()> {
    let summaries = store.track_summaries()?;

    if json {
        return print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("No tracks stored");
        return Ok(());
    }

    println!("{:<10} {:>7} {:>10}  {:<25} {:<25}", "TAG", "POINTS", "KM", "FIRST", "LAST");
    for summary in summaries {
        println!(
            "{:<10} {:>7} {:>10.3}  {:<25} {:<25}",
            summary.tag.to_string(),
            summary.points,
            summary.distance_km,
            summary.first_at.format(&Rfc3339)?,
            summary.last_at.format(&Rfc3339)?
        );
    }
    Ok(())
}

fn cmd_positions(store: &Store, query: &PositionQuery, json: bool) -> anyhow::Result<()> {
    let positions = store.query_positions(query)?;

    if json {
        return print_json(&positions);
    }
    if positions.is_empty() {
        println!("No positions found");
        return Ok(());
    }

    println!(
        "{:<25} {:<12} {:>11} {:>11} {:>9}  {:<8}",
        "TIME", "DEVICE", "LAT", "LON", "KM", "TAG"
    );
    for position in positions {
        println!(
            "{:<25} {:<12} {:>11.6} {:>11.6} {:>9.3}  {:<8}",
            position.recorded_at.format(&Rfc3339)?,
            position.device_key,
            position.coordinate.latitude,
            position.coordinate.longitude,
            position.distance_km,
            position.tag.to_string()
        );
    }
    Ok(())
}

fn handle_config(
    action: &ConfigAction,
    config: &Config,
    path: &Path,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            let shown = redacted(config);
            if json {
                return print_json(&shown);
            }
            print!("{}", toml::to_string_pretty(&shown)?);
        }
        ConfigAction::Validate => {
            config.validate()?;
            println!("Configuration is valid");
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

/// Copy of `config` with credentials masked.
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if !shown.source.api_key.is_empty() {
        shown.source.api_key = "***".to_string();
    }
    if let Ok(dsn) = shown.storage.dsn.parse::<Dsn>() {
        shown.storage.dsn = dsn.to_string();
    }
    shown
}
