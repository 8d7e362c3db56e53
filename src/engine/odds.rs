//! Odds conversion and model-vs-market arithmetic. Pure functions only.

use super::sport::SportProfile;
use super::types::{ModelPrediction, Side};

/// Probabilities are kept inside (EPS, 1 - EPS) before any log/logit/division.
pub const PROB_EPS: f64 = 1e-7;

/// Bounds of the tanh cover approximation.
const COVER_PROB_MIN: f64 = 0.1;
const COVER_PROB_MAX: f64 = 0.9;

pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// American odds to implied probability (vig included).
///
/// +150 → 100/250 = 0.40, -150 → 150/250 = 0.60.
pub fn american_to_implied(odds: i32) -> f64 {
    let odds = odds as f64;
    if odds > 0.0 {
        100.0 / (odds + 100.0)
    } else {
        let abs = odds.abs();
        abs / (abs + 100.0)
    }
}

/// Decimal price to American odds, rounded to the nearest integer.
pub fn decimal_to_american(decimal: f64) -> i32 {
    if decimal >= 2.0 {
        ((decimal - 1.0) * 100.0).round() as i32
    } else {
        let net = (decimal - 1.0).max(1e-6);
        (-100.0 / net).round() as i32
    }
}

pub fn american_to_decimal(odds: i32) -> f64 {
    let odds = odds as f64;
    if odds >= 100.0 {
        1.0 + odds / 100.0
    } else if odds <= -100.0 {
        1.0 + 100.0 / odds.abs()
    } else {
        // -100 < odds < 100 is not a real quote; treat as even money.
        2.0
    }
}

/// Implied probability of a decimal price, through its American representation.
pub fn implied_from_decimal(decimal: f64) -> f64 {
    american_to_implied(decimal_to_american(decimal))
}

pub fn edge(model_prob: f64, implied_prob: f64) -> f64 {
    model_prob - implied_prob
}

/// Expected value in percent of stake.
pub fn expected_value_pct(model_prob: f64, implied_prob: f64) -> f64 {
    let implied = clamp_probability(implied_prob);
    (model_prob * (1.0 / implied - 1.0) - (1.0 - model_prob)) * 100.0
}

/// `0.5 + 0.5·tanh(diff / std_dev)` clamped to [0.1, 0.9].
fn bounded_logistic(diff: f64, std_dev: f64) -> f64 {
    let scale = std_dev.max(f64::EPSILON);
    (0.5 + 0.5 * (diff / scale).tanh()).clamp(COVER_PROB_MIN, COVER_PROB_MAX)
}

/// The model's predicted outcome, shared by every market calculator of an event.
///
/// Moneyline-at-zero and spread cover probabilities both come from the same
/// margin, so they cannot disagree for the same side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedMargin {
    /// Home minus away.
    pub margin: f64,
    pub total: f64,
    pub spread_std_dev: f64,
    pub total_std_dev: f64,
}

impl PredictedMargin {
    pub fn new(prediction: &ModelPrediction, profile: &SportProfile) -> Self {
        PredictedMargin {
            margin: prediction.predicted_spread,
            total: prediction.predicted_total,
            spread_std_dev: profile.spread_std_dev,
            total_std_dev: profile.total_std_dev,
        }
    }

    /// Probability that `side` covers the spread `point`, quoted in market
    /// convention for that side (negative = laying points).
    pub fn cover_probability(&self, side: Side, point: f64) -> f64 {
        let margin_needed = -point;
        let side_margin = match side {
            Side::Away => -self.margin,
            _ => self.margin,
        };
        bounded_logistic(side_margin - margin_needed, self.spread_std_dev)
    }

    /// Margin-derived outright win probability (the zero-point cover).
    pub fn win_probability(&self, side: Side) -> f64 {
        self.cover_probability(side, 0.0)
    }

    /// Probability of the total landing on `side` of `line`.
    pub fn total_probability(&self, side: Side, line: f64) -> f64 {
        let diff = match side {
            Side::Under => line - self.total,
            _ => self.total - line,
        };
        bounded_logistic(diff, self.total_std_dev)
    }
}
