//! CLI entry point for the lane pricer.
//!
//! Provides subcommands for quoting a lane, inspecting the matched tiers of a
//! lane, and listing the vehicle types present in a dataset.

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use lane_pricer::{
    config::PricingConfig,
    dataset::{POSTCODE_ROUNDING_DP, fill_missing_postcodes, load_shipments, vehicle_types},
    fetch::BasicClient,
    geocode::{Geocoder, PostcodeCache, PostcodesIo},
    matching::{RouteQuery, TierKind, find_similar_routes},
    output::{append_quote, export_tiers, print_json, print_pretty},
    quote::quote_route,
    shipment::ShipmentRecord,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "lane_pricer")]
#[command(about = "Estimate freight lane prices from shipment history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Shipment history CSV
    #[arg(short, long, default_value = "data/shipments.csv")]
    data: PathBuf,

    /// Postcode coordinate cache (JSON)
    #[arg(long, default_value = "data/postcode_cache.json")]
    cache: PathBuf,
}

#[derive(Args)]
struct LaneArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Origin postcode
    #[arg(short, long)]
    origin: String,

    /// Destination postcode
    #[arg(long)]
    dest: String,

    /// Only compare shipments of this vehicle type
    #[arg(short, long)]
    vehicle: Option<String>,

    /// Resolve postcodes from the cache only, never over the network
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the carrier price of a lane
    Quote {
        #[command(flatten)]
        lane: LaneArgs,

        /// Minimum valid loads a tier pool needs
        #[arg(long)]
        min_count: Option<usize>,

        /// Density bandwidth, in currency units
        #[arg(long)]
        bandwidth: Option<f64>,

        /// Weight all years equally
        #[arg(long, default_value_t = false)]
        no_time_weighting: bool,

        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Optional: CSV file to append the quote to
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Show the shipments matched to a lane, tier by tier
    Matches {
        #[command(flatten)]
        lane: LaneArgs,

        /// Optional: directory to write one CSV per tier into
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// Print tier counts as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List the vehicle types present in the dataset
    VehicleTypes {
        #[command(flatten)]
        data: DataArgs,

        /// Print as a JSON array
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/lane_pricer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("lane_pricer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Quote {
            lane,
            min_count,
            bandwidth,
            no_time_weighting,
            json,
            history,
        } => {
            let mut config = PricingConfig::from_env()?;
            if let Some(min_count) = min_count {
                config.min_count = min_count;
            }
            if let Some(bandwidth) = bandwidth {
                config.target_bandwidth = bandwidth;
            }
            if no_time_weighting {
                config.use_time_weighting = false;
            }
            config.validate()?;

            let (rows, resolver) = open_lane(&lane)?;
            let query = RouteQuery::new(&lane.origin, &lane.dest, lane.vehicle.as_deref());
            let today = Utc::now().date_naive();

            let result = quote_route(&rows, query, resolver.geocoder(), &config, today).await;
            resolver.persist(&lane.data.cache)?;
            let report = result?;

            if json {
                print_json(&report)?;
            } else {
                print_pretty(&report);
            }
            if let Some(path) = history {
                append_quote(&path, &report, today)?;
                info!(path = %path.display(), "Quote appended to history");
            }
        }
        Commands::Matches {
            lane,
            export_dir,
            json,
        } => {
            let (rows, resolver) = open_lane(&lane)?;

            let result = find_similar_routes(
                &rows,
                &lane.origin,
                &lane.dest,
                lane.vehicle.as_deref(),
                resolver.geocoder(),
            )
            .await;
            resolver.persist(&lane.data.cache)?;
            let tiers = result?;

            if json {
                print_json(&tiers.counts())?;
            } else {
                let counts = tiers.counts();
                for kind in TierKind::LADDER {
                    println!("{:<16} {}", kind.label(), counts.get(kind));
                }
            }
            if let Some(dir) = export_dir {
                export_tiers(&dir, &tiers)?;
            }
        }
        Commands::VehicleTypes { data, json } => {
            let cache = PostcodeCache::load(&data.cache)?;
            let rows = load_dataset(&data.data, &cache)?;
            let types = vehicle_types(&rows);

            if json {
                print_json(&types)?;
            } else {
                for vehicle_type in &types {
                    println!("{vehicle_type}");
                }
            }
        }
    }

    Ok(())
}

/// Where postcode coordinates come from for this run.
enum Resolver {
    Offline(PostcodeCache),
    Online(PostcodesIo<BasicClient>),
}

impl Resolver {
    fn geocoder(&self) -> &dyn Geocoder {
        match self {
            Resolver::Offline(cache) => cache,
            Resolver::Online(resolver) => resolver,
        }
    }

    /// Saves newly resolved postcodes, if any.
    fn persist(self, path: &Path) -> Result<()> {
        let Resolver::Online(resolver) = self else {
            return Ok(());
        };
        let mut cache = resolver.into_cache();
        if cache.is_dirty() {
            cache.save(path)?;
        }
        Ok(())
    }
}

/// Loads the cache and dataset for a lane query and picks the resolver.
fn open_lane(lane: &LaneArgs) -> Result<(Vec<ShipmentRecord>, Resolver)> {
    let cache = PostcodeCache::load(&lane.data.cache)?;
    let rows = load_dataset(&lane.data.data, &cache)?;

    let resolver = if lane.offline {
        info!(entries = cache.len(), "Offline mode, resolving from cache only");
        Resolver::Offline(cache)
    } else {
        Resolver::Online(PostcodesIo::new(BasicClient::new()?, cache)?)
    };
    Ok((rows, resolver))
}

/// Reads the dataset and repairs missing postcodes from the cache.
#[tracing::instrument(skip(cache), fields(path = %path.display()))]
fn load_dataset(path: &Path, cache: &PostcodeCache) -> Result<Vec<ShipmentRecord>> {
    let mut rows = load_shipments(path)?;

    let index = cache.reverse_index(POSTCODE_ROUNDING_DP);
    if index.is_empty() {
        warn!("Postcode cache is empty, missing postcodes stay unfilled");
    } else {
        let filled = fill_missing_postcodes(&mut rows, &index);
        info!(filled, "Filled missing postcodes");
    }
    Ok(rows)
}
