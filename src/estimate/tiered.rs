use tracing::{debug, info};

use crate::estimate::aggregate::estimate_price_from_rows;
use crate::estimate::types::{EstimateMethod, PriceEstimate, PriceStats, TimeWeighting};
use crate::matching::{RouteTiers, TierKind};
use crate::shipment::MatchedShipment;

pub const DEFAULT_MIN_COUNT: usize = 5;

/// One rung of the ladder: the cumulative pool of tiers and its statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderStep {
    pub tiers: Vec<TierKind>,
    /// Rows in the pool, counting a row once per tier it appears in.
    pub rows_considered: usize,
    pub stats: Option<PriceStats>,
}

impl LadderStep {
    pub fn label(&self) -> String {
        self.tiers
            .iter()
            .map(TierKind::label)
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn valid_count(&self) -> usize {
        self.stats.as_ref().map_or(0, |s| s.valid_count)
    }

    pub fn meets(&self, min_count: usize) -> bool {
        self.stats.is_some() && self.valid_count() >= min_count
    }
}

/// Walks the tiers tightest first, concatenating each into the pool.
///
/// The pool is a multiset union: a shipment present in two tiers counts twice.
pub struct TierLadder<'a> {
    tiers: &'a RouteTiers,
    weighting: TimeWeighting,
    next: usize,
    pool: Vec<&'a MatchedShipment>,
    used: Vec<TierKind>,
}

impl<'a> TierLadder<'a> {
    pub fn new(tiers: &'a RouteTiers, weighting: TimeWeighting) -> Self {
        Self {
            tiers,
            weighting,
            next: 0,
            pool: Vec::new(),
            used: Vec::with_capacity(TierKind::LADDER.len()),
        }
    }
}

impl Iterator for TierLadder<'_> {
    type Item = LadderStep;

    fn next(&mut self) -> Option<LadderStep> {
        let kind = *TierKind::LADDER.get(self.next)?;
        self.next += 1;

        self.pool.extend(self.tiers.get(kind));
        self.used.push(kind);

        let step = LadderStep {
            tiers: self.used.clone(),
            rows_considered: self.pool.len(),
            stats: estimate_price_from_rows(&self.pool, self.weighting),
        };
        debug!(
            tiers = %step.label(),
            rows = step.rows_considered,
            valid_count = step.valid_count(),
            "Evaluated tier pool"
        );
        Some(step)
    }
}

/// Returns the estimate from the first tier pool with at least `min_count` valid loads.
///
/// `None` when even the widest pool falls short; that is a normal outcome
/// for thin lanes, not an error.
pub fn estimate_price(
    tiers: &RouteTiers,
    min_count: usize,
    weighting: TimeWeighting,
) -> Option<PriceEstimate> {
    let Some(step) = TierLadder::new(tiers, weighting).find(|s| s.meets(min_count)) else {
        info!(min_count, "No tier pool reached the minimum sample size");
        return None;
    };

    let label = step.label();
    let stats = step.stats?;
    info!(
        tiers = %label,
        valid_count = stats.valid_count,
        price = stats.volume_time_weighted_avg_cost,
        "Tiered estimate found"
    );

    Some(PriceEstimate {
        price: stats.volume_time_weighted_avg_cost,
        explanation: format!("Estimated from {} loads ({}).", stats.valid_count, label),
        method: EstimateMethod::TieredAggregate { tiers: step.tiers },
        stats: Some(stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn shipment(price: f64) -> MatchedShipment {
        MatchedShipment {
            origin_postcode: "SW1A1AA".into(),
            destination_postcode: "B112AB".into(),
            carrier_price: price,
            vehicle_type: "Van".into(),
            pickup_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            contract_type: "Spot".into(),
            shipper_price: price * 1.2,
            carrier_name: "Acme".into(),
            shipper_id: 1,
        }
    }

    fn many(n: usize, price: f64) -> Vec<MatchedShipment> {
        (0..n).map(|_| shipment(price)).collect()
    }

    #[test]
    fn test_first_tier_wins_when_large_enough() {
        let tiers = RouteTiers {
            three_letter: many(5, 200.0),
            within_10km: many(50, 900.0),
            ..Default::default()
        };
        let estimate = estimate_price(&tiers, DEFAULT_MIN_COUNT, TimeWeighting::Uniform).unwrap();
        assert_eq!(estimate.price, 200.0);
        assert_eq!(
            estimate.method,
            EstimateMethod::TieredAggregate {
                tiers: vec![TierKind::ThreeLetter]
            }
        );
        assert_eq!(estimate.explanation, "Estimated from 5 loads (3-letter prefix).");
    }

    #[test]
    fn test_widens_until_threshold_and_counts_duplicates() {
        let shared = shipment(100.0);
        let tiers = RouteTiers {
            three_letter: vec![shared.clone(), shipment(100.0), shipment(100.0)],
            within_10km: vec![shared.clone(), shipment(130.0)],
            within_20km: many(10, 999.0),
            ..Default::default()
        };
        let estimate = estimate_price(&tiers, 5, TimeWeighting::Uniform).unwrap();
        let stats = estimate.stats.unwrap();
        assert_eq!(stats.valid_count, 5);
        assert!((estimate.price - 106.0).abs() < 1e-9);
        assert_eq!(
            estimate.explanation,
            "Estimated from 5 loads (3-letter prefix + within 10km)."
        );
    }

    #[test]
    fn test_thin_lane_has_no_estimate() {
        let tiers = RouteTiers {
            three_letter: many(1, 100.0),
            within_10km: many(1, 100.0),
            two_letter: many(1, 100.0),
            ..Default::default()
        };
        assert!(estimate_price(&tiers, DEFAULT_MIN_COUNT, TimeWeighting::Uniform).is_none());

        let steps: Vec<_> = TierLadder::new(&tiers, TimeWeighting::Uniform).collect();
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| !s.meets(DEFAULT_MIN_COUNT)));
        assert_eq!(steps[3].valid_count(), 3);
    }

    #[test]
    fn test_ladder_volume_never_decreases() {
        let tiers = RouteTiers {
            three_letter: many(2, 100.0),
            within_10km: Vec::new(),
            within_20km: many(3, 150.0),
            two_letter: many(1, 175.0),
        };
        let steps: Vec<_> = TierLadder::new(&tiers, TimeWeighting::Uniform).collect();
        for pair in steps.windows(2) {
            assert!(pair[1].rows_considered >= pair[0].rows_considered);
            assert!(pair[1].valid_count() >= pair[0].valid_count());
        }
        assert_eq!(
            steps.last().unwrap().label(),
            "3-letter prefix + within 10km + within 20km + 2-letter prefix"
        );
    }

    #[test]
    fn test_empty_tiers_have_no_estimate() {
        let tiers = RouteTiers::default();
        assert!(estimate_price(&tiers, 1, TimeWeighting::Uniform).is_none());
    }
}
