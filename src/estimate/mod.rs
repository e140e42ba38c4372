//! Price estimation over matched route tiers.
//!
//! Two estimators share this module: a tiered volume/time-weighted average
//! that widens the comparable pool only as far as needed, and a density-peak
//! estimator that picks the dominant price band of a single pool.

pub mod aggregate;
pub mod density;
pub mod tiered;
pub mod types;
pub mod utility;

pub use aggregate::estimate_price_from_rows;
pub use density::{DensityFilter, identify_optimal_price, optimal_price_for_rows};
pub use tiered::{LadderStep, TierLadder, estimate_price};
pub use types::{EstimateMethod, PriceEstimate, PriceStats, TimeWeighting};
