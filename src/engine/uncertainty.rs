//! Confidence discount for wide simulated outcome ranges.
//!
//! The multiplier scales a bet's confidence, never its edge.

use super::sport::{CiThreshold, SportProfile};
use super::types::{MarketType, Uncertainty};

/// Multiplier applied once the interval reaches the filter width.
pub const UNCERTAINTY_FLOOR: f64 = 0.4;

/// 1.0 up to the acceptable width, linear decay to the floor at the filter width.
pub fn ci_multiplier(width: f64, threshold: CiThreshold) -> f64 {
    if width.is_nan() || width <= threshold.acceptable {
        return 1.0;
    }
    if width >= threshold.filter {
        return UNCERTAINTY_FLOOR;
    }
    let span = threshold.filter - threshold.acceptable;
    let frac = (width - threshold.acceptable) / span;
    1.0 - frac * (1.0 - UNCERTAINTY_FLOOR)
}

/// Multiplier for a bet in `market`. Point estimates carry no penalty; moneyline
/// confidence is handled by the disagreement gate instead.
pub fn uncertainty_multiplier(
    uncertainty: &Uncertainty,
    market: MarketType,
    profile: &SportProfile,
) -> f64 {
    match uncertainty {
        Uncertainty::PointEstimateOnly => 1.0,
        Uncertainty::Simulated {
            spread_ci_width,
            total_ci_width,
            ..
        } => match market {
            MarketType::Spread => ci_multiplier(*spread_ci_width, profile.spread_ci),
            MarketType::Total => ci_multiplier(*total_ci_width, profile.total_ci),
            MarketType::Moneyline => 1.0,
        },
    }
}

pub fn weight_confidence(confidence: u32, multiplier: f64) -> u32 {
    (confidence as f64 * multiplier).round().clamp(0.0, 100.0) as u32
}
