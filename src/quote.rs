//! End-to-end pricing of one lane: match, then estimate.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PricingConfig;
use crate::estimate::{
    DensityFilter, EstimateMethod, PriceEstimate, TimeWeighting, estimate_price,
    estimate_price_from_rows, optimal_price_for_rows,
};
use crate::geocode::Geocoder;
use crate::matching::{RouteQuery, RouteTiers, TierCounts, match_routes};
use crate::shipment::{MatchedShipment, ShipmentRecord};

/// Everything a caller needs to present a quote.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteReport {
    pub origin_postcode: String,
    pub destination_postcode: String,
    pub vehicle_type: Option<String>,
    pub tier_counts: TierCounts,
    /// 3-letter matches picked up inside the recent window.
    pub recent_three_letter: usize,
    pub estimate: Option<PriceEstimate>,
}

impl QuoteReport {
    pub fn summary(&self) -> String {
        match &self.estimate {
            Some(estimate) => format!(
                "Price estimate: £{:.2}. {}",
                estimate.price, estimate.explanation
            ),
            None if self.tier_counts == TierCounts::default() => "No data available".to_string(),
            None => "Not enough data for a reliable price estimate".to_string(),
        }
    }
}

/// Rows picked up on or after `today - window_days`. Undated rows are dropped.
///
/// A window reaching past the earliest representable date has no cutoff.
pub fn recent_rows(rows: &[MatchedShipment], today: NaiveDate, window_days: i64) -> Vec<MatchedShipment> {
    let cutoff = Duration::try_days(window_days).and_then(|w| today.checked_sub_signed(w));
    rows.iter()
        .filter(|r| {
            r.pickup_date
                .is_some_and(|d| cutoff.is_none_or(|cutoff| d >= cutoff))
        })
        .cloned()
        .collect()
}

/// Prices already-matched tiers.
///
/// With enough recent 3-letter matches the density-peak estimate is tried
/// first; otherwise, or when it finds nothing, the tiered average decides.
pub fn price_tiers(tiers: &RouteTiers, config: &PricingConfig, today: NaiveDate) -> Option<PriceEstimate> {
    let weighting = TimeWeighting::new(config.use_time_weighting, today);
    let recent = recent_rows(&tiers.three_letter, today, config.recent_window_days);

    if recent.len() >= config.min_recent_density_rows {
        if let Some(price) =
            optimal_price_for_rows(&recent, &DensityFilter::default(), config.target_bandwidth)
        {
            info!(price, recent = recent.len(), "Density-peak estimate found");
            return Some(PriceEstimate {
                price,
                explanation: format!(
                    "Estimated using lowest fair price in last {} days",
                    config.recent_window_days
                ),
                method: EstimateMethod::DensityPeak,
                stats: estimate_price_from_rows(&recent, weighting),
            });
        }
        info!(recent = recent.len(), "No density-peak estimate, falling back to tiers");
    } else {
        debug!(
            recent = recent.len(),
            required = config.min_recent_density_rows,
            "Too few recent 3-letter matches for a density estimate"
        );
    }

    estimate_price(tiers, config.min_count, weighting)
}

/// Resolves, matches and prices one lane.
///
/// Geocoding failures are errors; a lane without enough history is a report
/// with no estimate.
#[tracing::instrument(
    skip(rows, geocoder, config),
    fields(origin = %query.origin_postcode(), destination = %query.destination_postcode())
)]
pub async fn quote_route<G>(
    rows: &[ShipmentRecord],
    query: RouteQuery,
    geocoder: &G,
    config: &PricingConfig,
    today: NaiveDate,
) -> Result<QuoteReport>
where
    G: Geocoder + ?Sized,
{
    let resolved = query.resolve(geocoder).await?;
    let tiers = match_routes(rows, &resolved);
    let estimate = price_tiers(&tiers, config, today);

    let query = resolved.query;
    Ok(QuoteReport {
        origin_postcode: query.origin_postcode().to_string(),
        destination_postcode: query.destination_postcode().to_string(),
        vehicle_type: query.vehicle_type().map(str::to_string),
        tier_counts: tiers.counts(),
        recent_three_letter: recent_rows(&tiers.three_letter, today, config.recent_window_days).len(),
        estimate,
    })
}
