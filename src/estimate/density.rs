//! Density-peak ("most likely price") estimation.
//!
//! Prices on one lane often fall into distinct bands, for example by load
//! size. Rather than averaging across bands, this estimator smooths the
//! observed prices into a continuous density and returns the cheapest price
//! band that carries real weight. When no density peak is strong enough it
//! falls back to the most populated fixed-width price bin.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use tracing::{debug, warn};

use crate::estimate::utility::{iqr, mean, min_max, sample_stddev};
use crate::shipment::{PricedRow, is_priceable};

pub const DEFAULT_TARGET_BANDWIDTH: f64 = 5.0;
pub const MIN_OBSERVATIONS: usize = 5;
pub const GRID_POINTS: usize = 1000;
/// Peaks below this share of the uniform density over the price range are noise.
pub const PEAK_THRESHOLD_FACTOR: f64 = 0.1;

/// Optional row filters applied before estimating.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DensityFilter {
    pub route_key: Option<String>,
    pub vehicle_type: Option<String>,
}

impl DensityFilter {
    fn accepts<R: PricedRow>(&self, row: &R) -> bool {
        self.route_key.as_ref().is_none_or(|k| row.route_key() == *k)
            && self
                .vehicle_type
                .as_deref()
                .is_none_or(|v| row.vehicle_type() == v)
    }
}

/// Filters rows, then runs [`identify_optimal_price`] over their carrier prices.
pub fn optimal_price_for_rows<R: PricedRow>(
    rows: &[R],
    filter: &DensityFilter,
    target_bandwidth: f64,
) -> Option<f64> {
    let prices: Vec<f64> = rows
        .iter()
        .filter(|row| filter.accepts(*row))
        .filter_map(PricedRow::carrier_price)
        .filter(|p| is_priceable(Some(*p)))
        .collect();
    identify_optimal_price(&prices, target_bandwidth)
}

/// The lowest dominant price in `prices`, or `None` when there is too little
/// data or no spread to smooth over.
pub fn identify_optimal_price(prices: &[f64], target_bandwidth: f64) -> Option<f64> {
    if !(target_bandwidth > 0.0 && target_bandwidth.is_finite()) {
        warn!(target_bandwidth, "Density bandwidth must be positive");
        return None;
    }

    let prices: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if prices.len() < MIN_OBSERVATIONS {
        debug!(observations = prices.len(), "Too few prices for density estimate");
        return None;
    }

    let avg = mean(&prices);
    let stddev = sample_stddev(&prices, avg)?;
    let spread = match iqr(&prices)? {
        q if q > 0.0 => q,
        _ => stddev,
    };
    if spread == 0.0 {
        debug!(observations = prices.len(), "Prices have no spread");
        return None;
    }

    let kde = GaussianKde::new(&prices, target_bandwidth / spread, stddev);
    let (lo, hi) = min_max(&prices)?;
    let grid = linspace(lo, hi, GRID_POINTS);
    let density: Vec<f64> = grid.iter().map(|x| kde.evaluate(*x)).collect();

    let threshold = PEAK_THRESHOLD_FACTOR * prices.len() as f64 / (hi - lo);

    if let Some(idx) = find_peaks(&density)
        .into_iter()
        .find(|&i| density[i] >= threshold)
    {
        debug!(price = grid[idx], density = density[idx], threshold, "Density peak found");
        return Some(grid[idx]);
    }

    let fallback = binned_mode(&prices, target_bandwidth);
    debug!(?fallback, threshold, "No qualifying density peak, using binned mode");
    fallback
}

/// Gaussian kernel density estimate with a scalar bandwidth factor.
///
/// The kernel width is `factor × sample standard deviation` of the data.
struct GaussianKde<'a> {
    data: &'a [f64],
    kernel_sd: f64,
    norm: f64,
}

impl<'a> GaussianKde<'a> {
    fn new(data: &'a [f64], factor: f64, stddev: f64) -> Self {
        let kernel_sd = factor * stddev;
        Self {
            data,
            kernel_sd,
            norm: 1.0 / (data.len() as f64 * kernel_sd * (2.0 * PI).sqrt()),
        }
    }

    fn evaluate(&self, x: f64) -> f64 {
        let sum: f64 = self
            .data
            .iter()
            .map(|xi| {
                let z = (x - xi) / self.kernel_sd;
                (-0.5 * z * z).exp()
            })
            .sum();
        sum * self.norm
    }
}

/// `n` evenly spaced points from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Indices of local maxima, excluding both ends.
///
/// A flat-topped peak reports its middle index (the lower one for an even width).
pub fn find_peaks(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }

    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Left edge of the most populated `width`-wide price bin; ties go to the cheapest bin.
pub fn binned_mode(prices: &[f64], width: f64) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for price in prices {
        *counts.entry((price / width).floor() as i64).or_default() += 1;
    }

    let mut best: Option<(i64, usize)> = None;
    for (bin, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((bin, count));
        }
    }
    best.map(|(bin, _)| bin as f64 * width)
}
