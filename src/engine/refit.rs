//! Refit the recalibration curve from validated outcomes and decide whether
//! the new curve replaces the active one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::calibration::{fit_platt, FitMetrics, FitOutcome, RecalibrationParams};
use super::evaluation::{compare, evaluate, CalibrationComparison, EvaluationReport};
use super::types::ValidatedOutcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RefitDecision {
    Insufficient {
        samples: usize,
        required: usize,
    },
    Adopted {
        params: RecalibrationParams,
        /// In-sample fit against the raw probabilities.
        fit: FitMetrics,
        before: EvaluationReport,
        after: EvaluationReport,
        comparison: CalibrationComparison,
    },
    /// The candidate did not beat the active params; nothing is stored.
    Rejected {
        candidate: RecalibrationParams,
        fit: FitMetrics,
        comparison: CalibrationComparison,
    },
}

/// Fit a candidate on `outcomes` and evaluate it against `active` on the same set.
///
/// An adopted candidate carries `active.version + 1`; persisting it is up to the caller.
pub fn refit(
    outcomes: &[ValidatedOutcome],
    active: &RecalibrationParams,
    min_samples: usize,
    now: DateTime<Utc>,
) -> RefitDecision {
    let samples: Vec<(f64, f64)> = outcomes
        .iter()
        .map(|o| (o.predicted_home_win_prob, if o.home_won() { 1.0 } else { 0.0 }))
        .collect();

    let fit = match fit_platt(&samples, min_samples) {
        FitOutcome::Insufficient { samples } => {
            info!("Recalibration skipped: {} of {} samples", samples, min_samples);
            return RefitDecision::Insufficient {
                samples,
                required: min_samples,
            };
        }
        FitOutcome::Fitted(fit) => fit,
    };

    let candidate = RecalibrationParams {
        a: fit.a,
        b: fit.b,
        version: active.version + 1,
        samples: fit.samples,
        fitted_at: Some(now),
    };
    let before = evaluate(outcomes, active);
    let after = evaluate(outcomes, &candidate);
    let comparison = compare(&before, &after);

    if comparison.improves {
        info!(
            "Recalibration v{} adopted: a={:.1} b={:.1} log loss {:.4} → {:.4}",
            candidate.version, candidate.a, candidate.b, before.log_loss, after.log_loss
        );
        RefitDecision::Adopted {
            params: candidate,
            fit: fit.metrics,
            before,
            after,
            comparison,
        }
    } else {
        info!(
            "Recalibration candidate a={:.1} b={:.1} rejected (log loss Δ {:+.4}, brier Δ {:+.4})",
            candidate.a, candidate.b, comparison.log_loss_delta, comparison.brier_delta
        );
        RefitDecision::Rejected {
            candidate,
            fit: fit.metrics,
            comparison,
        }
    }
}
