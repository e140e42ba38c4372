//! Output formatting and persistence for quotes and matched tiers.
//!
//! Supports pretty-printing, JSON rendering, tier CSV export and an
//! append-only CSV history of quotes.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::estimate::EstimateMethod;
use crate::matching::{RouteTiers, TierKind};
use crate::quote::QuoteReport;
use crate::shipment::MatchedShipment;
use csv::WriterBuilder;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Prints a human-readable quote to stdout; the full report goes to the debug log.
pub fn print_pretty(report: &QuoteReport) {
    debug!("{:#?}", report);

    let vehicle = report.vehicle_type.as_deref().unwrap_or("any vehicle");
    println!(
        "{} -> {} ({vehicle})",
        report.origin_postcode, report.destination_postcode
    );
    for kind in TierKind::LADDER {
        println!("  {:<16} {}", kind.label(), report.tier_counts.get(kind));
    }
    println!("  recent 3-letter  {}", report.recent_three_letter);
    println!("{}", report.summary());
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints any serializable value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", render_json(value)?);
    Ok(())
}

/// Writes matched rows to a fresh CSV file with a header line.
pub fn write_tier_csv(path: &Path, rows: &[MatchedShipment]) -> Result<()> {
    debug!(path = %path.display(), rows = rows.len(), "Writing tier CSV");

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    if rows.is_empty() {
        writer.write_record(MatchedShipment::CSV_HEADERS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes one `<tier>.csv` per tier into `dir`, creating it if needed.
pub fn export_tiers(dir: &Path, tiers: &RouteTiers) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::with_capacity(TierKind::LADDER.len());
    for kind in TierKind::LADDER {
        let path = dir.join(format!("{}.csv", kind.slug()));
        write_tier_csv(&path, tiers.get(kind))?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "Exported tier rows");
    Ok(written)
}

/// Flat, one-line form of a [`QuoteReport`] for the history CSV.
#[derive(Debug, Serialize)]
struct QuoteRow<'a> {
    quoted_on: String,
    origin_postcode: &'a str,
    destination_postcode: &'a str,
    vehicle_type: &'a str,
    price: Option<f64>,
    method: &'static str,
    three_letter: usize,
    within_10km: usize,
    within_20km: usize,
    two_letter: usize,
    recent_three_letter: usize,
}

impl<'a> QuoteRow<'a> {
    fn new(report: &'a QuoteReport, quoted_on: chrono::NaiveDate) -> Self {
        let method = match report.estimate.as_ref().map(|e| &e.method) {
            Some(EstimateMethod::DensityPeak) => "density_peak",
            Some(EstimateMethod::TieredAggregate { .. }) => "tiered_aggregate",
            None => "none",
        };
        Self {
            quoted_on: quoted_on.format("%Y-%m-%d").to_string(),
            origin_postcode: &report.origin_postcode,
            destination_postcode: &report.destination_postcode,
            vehicle_type: report.vehicle_type.as_deref().unwrap_or(""),
            price: report.estimate.as_ref().map(|e| e.price),
            method,
            three_letter: report.tier_counts.three_letter,
            within_10km: report.tier_counts.within_10km,
            within_20km: report.tier_counts.within_20km,
            two_letter: report.tier_counts.two_letter,
            recent_three_letter: report.recent_three_letter,
        }
    }
}

/// Appends a quote as a row to a CSV history file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_quote(path: &Path, report: &QuoteReport, quoted_on: chrono::NaiveDate) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending quote to history");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // header only on a new file
        .from_writer(file);

    writer.serialize(QuoteRow::new(report, quoted_on))?;
    writer.flush()?;

    Ok(())
}
