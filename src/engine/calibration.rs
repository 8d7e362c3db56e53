//! Probability recalibration (Platt scaling).
//!
//! The model is `p_calibrated = sigmoid(a * logit(p_raw) + b)`, fitted by a
//! coarse grid search that minimises mean log loss over validated outcomes.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use super::odds::clamp_probability;

/// Below this many validated samples a fit is not trusted.
pub const MIN_FIT_SAMPLES: usize = 20;

/// Grid for `a`: 0.5..=2.0 in tenths.
const A_GRID: std::ops::RangeInclusive<i32> = 5..=20;
/// Grid for `b`: -0.5..=0.5 in tenths.
const B_GRID: std::ops::RangeInclusive<i32> = -5..=5;

/// Active recalibration coefficients. Replaced wholesale on refit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalibrationParams {
    pub a: f64,
    pub b: f64,
    /// 0 for the built-in passthrough.
    pub version: i64,
    pub samples: usize,
    pub fitted_at: Option<DateTime<Utc>>,
}

impl RecalibrationParams {
    pub fn passthrough() -> Self {
        RecalibrationParams {
            a: 1.0,
            b: 0.0,
            version: 0,
            samples: 0,
            fitted_at: None,
        }
    }

    pub fn apply(&self, raw_prob: f64) -> f64 {
        apply_platt(raw_prob, self.a, self.b)
    }
}

impl Default for RecalibrationParams {
    fn default() -> Self {
        Self::passthrough()
    }
}

/// Shared handle to the active params. Readers get a whole snapshot; a refit
/// swaps in a new one, so an (a, b) pair is never seen half-updated.
#[derive(Debug, Clone)]
pub struct CalibrationHandle {
    inner: Arc<RwLock<Arc<RecalibrationParams>>>,
}

impl CalibrationHandle {
    pub fn new(params: RecalibrationParams) -> Self {
        CalibrationHandle {
            inner: Arc::new(RwLock::new(Arc::new(params))),
        }
    }

    pub fn current(&self) -> Arc<RecalibrationParams> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, params: RecalibrationParams) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(params);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub logloss_before: f64,
    pub logloss_after: f64,
    pub brier_before: f64,
    pub brier_after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub a: f64,
    pub b: f64,
    pub samples: usize,
    pub metrics: FitMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    /// Too few samples; the active params stay in place.
    Insufficient { samples: usize },
    Fitted(FitResult),
}

fn logit(p: f64) -> f64 {
    let p = clamp_probability(p);
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

pub fn logloss(p: f64, y: f64) -> f64 {
    let p = clamp_probability(p);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

pub fn apply_platt(raw_prob: f64, a: f64, b: f64) -> f64 {
    let x = logit(raw_prob);
    sigmoid(a * x + b).clamp(0.0, 1.0)
}

fn mean_logloss(samples: &[(f64, f64)], a: f64, b: f64) -> f64 {
    let total: f64 = samples
        .iter()
        .map(|(p, y)| logloss(apply_platt(*p, a, b), *y))
        .sum();
    total / samples.len() as f64
}

/// Grid-search fit over (raw probability, outcome) pairs, outcome in {0, 1}.
pub fn fit_platt(samples: &[(f64, f64)], min_samples: usize) -> FitOutcome {
    let samples: Vec<(f64, f64)> = samples
        .iter()
        .copied()
        .filter(|(p, y)| p.is_finite() && y.is_finite())
        .collect();
    if samples.len() < min_samples.max(1) {
        return FitOutcome::Insufficient {
            samples: samples.len(),
        };
    }

    // Start from passthrough so ties keep the identity mapping.
    let mut best = (1.0, 0.0, mean_logloss(&samples, 1.0, 0.0));
    for ai in A_GRID {
        for bi in B_GRID {
            let a = ai as f64 / 10.0;
            let b = bi as f64 / 10.0;
            let loss = mean_logloss(&samples, a, b);
            if loss < best.2 - 1e-12 {
                best = (a, b, loss);
            }
        }
    }
    let (a, b, _) = best;

    let n = samples.len() as f64;
    let mut ll_before = 0.0;
    let mut ll_after = 0.0;
    let mut br_before = 0.0;
    let mut br_after = 0.0;
    for (raw_p, y) in &samples {
        let before = clamp_probability(*raw_p);
        let after = apply_platt(*raw_p, a, b);
        ll_before += logloss(before, *y);
        ll_after += logloss(after, *y);
        br_before += (before - *y).powi(2);
        br_after += (after - *y).powi(2);
    }
    FitOutcome::Fitted(FitResult {
        a,
        b,
        samples: samples.len(),
        metrics: FitMetrics {
            logloss_before: ll_before / n,
            logloss_after: ll_after / n,
            brier_before: br_before / n,
            brier_after: br_after / n,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Outcomes drawn from `p_true`; raw probabilities distorted in logit space.
    fn synthetic(n: usize, distortion: f64, seed: u64) -> Vec<(f64, f64)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let p_true: f64 = rng.gen_range(0.05..0.95);
                let y = if rng.gen::<f64>() < p_true { 1.0 } else { 0.0 };
                (sigmoid(distortion * logit(p_true)), y)
            })
            .collect()
    }

    #[test]
    fn passthrough_is_identity() {
        let params = RecalibrationParams::passthrough();
        for i in 1..100 {
            let p = i as f64 / 100.0;
            assert_relative_eq!(params.apply(p), p, epsilon = 1e-9);
        }
    }

    #[test]
    fn apply_platt_bounds_output() {
        let p = apply_platt(1.0, 2.0, 0.5);
        assert!((0.0..=1.0).contains(&p));
        let p = apply_platt(0.0, 2.0, -0.5);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn too_few_samples_is_a_no_op() {
        let samples = synthetic(19, 2.0, 1);
        assert_eq!(
            fit_platt(&samples, MIN_FIT_SAMPLES),
            FitOutcome::Insufficient { samples: 19 }
        );
    }

    #[test]
    fn overconfident_model_is_shrunk() {
        let samples = synthetic(3000, 2.0, 42);
        let FitOutcome::Fitted(fit) = fit_platt(&samples, MIN_FIT_SAMPLES) else {
            panic!("expected a fit");
        };
        assert!(fit.a <= 0.7, "a = {}", fit.a);
        assert!(fit.metrics.logloss_after < fit.metrics.logloss_before);
        assert!(fit.metrics.brier_after < fit.metrics.brier_before);
    }

    #[test]
    fn underconfident_model_is_stretched() {
        let samples = synthetic(3000, 0.5, 7);
        let FitOutcome::Fitted(fit) = fit_platt(&samples, MIN_FIT_SAMPLES) else {
            panic!("expected a fit");
        };
        assert!(fit.a >= 1.6, "a = {}", fit.a);
        assert!((-0.5..=0.5).contains(&fit.b));
    }

    #[test]
    fn fit_never_worsens_in_sample_logloss() {
        let samples = synthetic(200, 1.0, 3);
        let FitOutcome::Fitted(fit) = fit_platt(&samples, MIN_FIT_SAMPLES) else {
            panic!("expected a fit");
        };
        assert!(fit.metrics.logloss_after <= fit.metrics.logloss_before + 1e-12);
    }

    #[test]
    fn handle_swaps_whole_params() {
        let handle = CalibrationHandle::new(RecalibrationParams::passthrough());
        let before = handle.current();
        handle.replace(RecalibrationParams {
            a: 0.8,
            b: 0.1,
            version: 2,
            samples: 40,
            fitted_at: Some(Utc::now()),
        });
        let after = handle.current();
        assert_eq!(before.version, 0);
        assert_eq!((after.a, after.b, after.version), (0.8, 0.1, 2));
    }
}
