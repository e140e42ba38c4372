//! Tunable estimation parameters.
//!
//! Defaults can be overridden from the environment (a `.env` file works, the
//! binary loads it with `dotenvy`) and then from CLI flags.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::str::FromStr;

use crate::estimate::density::DEFAULT_TARGET_BANDWIDTH;
use crate::estimate::tiered::DEFAULT_MIN_COUNT;

pub const ENV_MIN_COUNT: &str = "LANE_PRICER_MIN_COUNT";
pub const ENV_TIME_WEIGHTING: &str = "LANE_PRICER_TIME_WEIGHTING";
pub const ENV_BANDWIDTH: &str = "LANE_PRICER_BANDWIDTH";
pub const ENV_RECENT_DAYS: &str = "LANE_PRICER_RECENT_DAYS";
pub const ENV_MIN_RECENT_ROWS: &str = "LANE_PRICER_MIN_RECENT_ROWS";

/// Longest accepted recent window, roughly a century.
pub const MAX_RECENT_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingConfig {
    /// Minimum valid loads a tier pool needs before its average is trusted.
    pub min_count: usize,
    pub use_time_weighting: bool,
    /// Density smoothing target and binned-mode width, in currency units.
    pub target_bandwidth: f64,
    /// How far back the density estimator looks, in days.
    pub recent_window_days: i64,
    /// Recent 3-letter matches required before the density estimator runs.
    pub min_recent_density_rows: usize,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            min_count: DEFAULT_MIN_COUNT,
            use_time_weighting: true,
            target_bandwidth: DEFAULT_TARGET_BANDWIDTH,
            recent_window_days: 365,
            min_recent_density_rows: 25,
        }
    }
}

impl PricingConfig {
    /// Defaults overlaid with any `LANE_PRICER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_MIN_COUNT)? {
            config.min_count = v;
        }
        if let Some(raw) = lookup(ENV_TIME_WEIGHTING) {
            config.use_time_weighting = parse_flag(&raw)
                .with_context(|| format!("invalid {ENV_TIME_WEIGHTING}"))?;
        }
        if let Some(v) = parse_var(&lookup, ENV_BANDWIDTH)? {
            config.target_bandwidth = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_RECENT_DAYS)? {
            config.recent_window_days = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_RECENT_ROWS)? {
            config.min_recent_density_rows = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_count == 0 {
            bail!("min_count must be at least 1");
        }
        if !(self.target_bandwidth > 0.0 && self.target_bandwidth.is_finite()) {
            bail!(
                "target_bandwidth must be a positive number, got {}",
                self.target_bandwidth
            );
        }
        if !(0..=MAX_RECENT_WINDOW_DAYS).contains(&self.recent_window_days) {
            bail!(
                "recent_window_days must be between 0 and {MAX_RECENT_WINDOW_DAYS}, got {}",
                self.recent_window_days
            );
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid {key}: '{raw}'"))
        })
        .transpose()
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
