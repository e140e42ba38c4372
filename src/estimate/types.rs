//! Data types produced by the price estimators.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::matching::TierKind;

/// Price statistics over one pool of comparable shipments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    /// Σ(price × volume × weight) / Σ(volume × weight) over (route, price) groups.
    pub volume_time_weighted_avg_cost: f64,
    pub avg_cost: f64,
    pub median_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
    /// Sample standard deviation; absent for a single observation.
    pub stddev_cost: Option<f64>,
    pub valid_count: usize,
}

/// How observations are weighted by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWeighting {
    Uniform,
    /// `1 / (years_ago + 1)`, with `years_ago` counted in calendar years.
    ByYear { current_year: i32 },
}

impl TimeWeighting {
    pub fn new(enabled: bool, today: NaiveDate) -> Self {
        if enabled {
            TimeWeighting::ByYear {
                current_year: today.year(),
            }
        } else {
            TimeWeighting::Uniform
        }
    }

    /// Pickups dated after the current year count as this year.
    pub fn weight(&self, pickup_date: NaiveDate) -> f64 {
        match self {
            TimeWeighting::Uniform => 1.0,
            TimeWeighting::ByYear { current_year } => {
                let years_ago = (current_year - pickup_date.year()).max(0);
                1.0 / (years_ago as f64 + 1.0)
            }
        }
    }
}

/// Which estimator produced a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateMethod {
    DensityPeak,
    TieredAggregate { tiers: Vec<TierKind> },
}

/// A single price plus a human-readable account of where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub price: f64,
    pub explanation: String,
    pub method: EstimateMethod,
    pub stats: Option<PriceStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 6, 15).unwrap()
    }

    #[test]
    fn test_uniform_weight() {
        assert_eq!(TimeWeighting::Uniform.weight(date(2001)), 1.0);
    }

    #[test]
    fn test_yearly_weight() {
        let w = TimeWeighting::ByYear { current_year: 2025 };
        assert_eq!(w.weight(date(2025)), 1.0);
        assert_eq!(w.weight(date(2024)), 0.5);
        assert_eq!(w.weight(date(2021)), 0.2);
    }

    #[test]
    fn test_future_pickup_counts_as_current_year() {
        let w = TimeWeighting::ByYear { current_year: 2025 };
        assert_eq!(w.weight(date(2027)), 1.0);
    }

    #[test]
    fn test_new_from_flag() {
        let today = date(2025);
        assert_eq!(TimeWeighting::new(false, today), TimeWeighting::Uniform);
        assert_eq!(
            TimeWeighting::new(true, today),
            TimeWeighting::ByYear { current_year: 2025 }
        );
    }
}
