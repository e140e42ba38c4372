use std::collections::BTreeMap;
use tracing::debug;

use crate::estimate::types::{PriceStats, TimeWeighting};
use crate::estimate::utility::{mean, median, min_max, sample_stddev};
use crate::shipment::{PricedRow, is_priceable};

/// Running totals for one (route key, carrier price) group.
#[derive(Debug, Default)]
struct GroupTally {
    volume: usize,
    weight_sum: f64,
}

impl GroupTally {
    fn avg_weight(&self) -> f64 {
        self.weight_sum / self.volume as f64
    }

    fn adjusted_volume(&self) -> f64 {
        self.volume as f64 * self.avg_weight()
    }
}

/// Computes volume- and time-weighted price statistics over a pool of rows.
///
/// Only rows with a priceable carrier price and a pickup date count. Rows are
/// grouped by (route key, carrier price); each group contributes its volume
/// scaled by its mean time weight. Returns `None` when no row qualifies.
pub fn estimate_price_from_rows<R: PricedRow>(
    rows: &[R],
    weighting: TimeWeighting,
) -> Option<PriceStats> {
    if rows.is_empty() {
        return None;
    }

    let mut prices = Vec::with_capacity(rows.len());
    // Keyed by price bits: prices are compared exactly, as grouping keys.
    let mut groups: BTreeMap<(String, u64), GroupTally> = BTreeMap::new();

    for row in rows {
        let Some(price) = row.carrier_price().filter(|p| is_priceable(Some(*p))) else {
            continue;
        };
        let Some(pickup_date) = row.pickup_date() else {
            continue;
        };

        prices.push(price);
        let tally = groups
            .entry((row.route_key(), price.to_bits()))
            .or_default();
        tally.volume += 1;
        tally.weight_sum += weighting.weight(pickup_date);
    }

    if prices.is_empty() {
        debug!(rows = rows.len(), "No priceable rows in pool");
        return None;
    }

    let mut adjusted_cost = 0.0;
    let mut adjusted_volume = 0.0;
    let mut valid_count = 0;

    for ((_, price_bits), tally) in &groups {
        let price = f64::from_bits(*price_bits);
        adjusted_volume += tally.adjusted_volume();
        adjusted_cost += price * tally.adjusted_volume();
        valid_count += tally.volume;
    }

    let avg_cost = mean(&prices);
    let (min_cost, max_cost) = min_max(&prices)?;

    Some(PriceStats {
        volume_time_weighted_avg_cost: adjusted_cost / adjusted_volume,
        avg_cost,
        median_cost: median(&prices)?,
        min_cost,
        max_cost,
        stddev_cost: sample_stddev(&prices, avg_cost),
        valid_count,
    })
}
