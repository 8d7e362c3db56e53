//! Accuracy and calibration metrics over validated outcomes.
//!
//! Read-only. It is also the yardstick for adopting a new recalibration fit:
//! a candidate is adopted only when its report beats the active one.

use serde::{Deserialize, Serialize};

use super::calibration::{logloss, RecalibrationParams};
use super::odds::clamp_probability;
use super::types::ValidatedOutcome;

/// Absolute cover margins below this are pushes.
const PUSH_MARGIN: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
}

impl Record {
    /// Win rate over decided bets; `None` when nothing was decided.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }

    fn add(&mut self, result: BetResult) {
        match result {
            BetResult::Win => self.wins += 1,
            BetResult::Loss => self.losses += 1,
            BetResult::Push => self.pushes += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BetResult {
    Win,
    Loss,
    Push,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub calibration_version: i64,
    pub brier_score: f64,
    pub log_loss: f64,
    pub winner_accuracy: f64,
    pub spread_mae: f64,
    pub total_mae: f64,
    /// Against the spread, only for outcomes with a market spread.
    pub ats: Record,
    pub over_under: Record,
}

/// Differences `after - before`; negative brier/log-loss deltas are improvements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationComparison {
    pub brier_delta: f64,
    pub log_loss_delta: f64,
    pub accuracy_delta: f64,
    pub improves: bool,
}

/// Evaluate `outcomes` with win probabilities passed through `params`.
pub fn evaluate(outcomes: &[ValidatedOutcome], params: &RecalibrationParams) -> EvaluationReport {
    let mut report = EvaluationReport {
        samples: outcomes.len(),
        calibration_version: params.version,
        brier_score: 0.0,
        log_loss: 0.0,
        winner_accuracy: 0.0,
        spread_mae: 0.0,
        total_mae: 0.0,
        ats: Record::default(),
        over_under: Record::default(),
    };
    if outcomes.is_empty() {
        return report;
    }

    let n = outcomes.len() as f64;
    let mut correct = 0usize;
    for o in outcomes {
        let p = clamp_probability(params.apply(o.predicted_home_win_prob));
        let y = if o.home_won() { 1.0 } else { 0.0 };
        report.brier_score += (p - y).powi(2);
        report.log_loss += logloss(p, y);
        if (p >= 0.5) == o.home_won() {
            correct += 1;
        }
        report.spread_mae += (o.predicted_spread - o.actual_margin()).abs();
        report.total_mae += (o.predicted_total - o.actual_total()).abs();

        if let Some(result) = o.market_spread.and_then(|line| ats_result(o, line)) {
            report.ats.add(result);
        }
        if let Some(result) = o.market_total.and_then(|line| over_under_result(o, line)) {
            report.over_under.add(result);
        }
    }
    report.brier_score /= n;
    report.log_loss /= n;
    report.winner_accuracy = correct as f64 / n;
    report.spread_mae /= n;
    report.total_mae /= n;
    report
}

/// Compare a candidate report against the active one over the same outcomes.
///
/// Improves when log loss drops and the Brier score does not rise.
pub fn compare(before: &EvaluationReport, after: &EvaluationReport) -> CalibrationComparison {
    let brier_delta = after.brier_score - before.brier_score;
    let log_loss_delta = after.log_loss - before.log_loss;
    let accuracy_delta = after.winner_accuracy - before.winner_accuracy;
    CalibrationComparison {
        brier_delta,
        log_loss_delta,
        accuracy_delta,
        improves: after.samples > 0 && log_loss_delta < -1e-9 && brier_delta <= 1e-12,
    }
}

/// Market spread is quoted for home, negative = home favourite. The model's
/// line is the negation (positive = home favoured).
fn ats_result(o: &ValidatedOutcome, market_spread: f64) -> Option<BetResult> {
    let model_line = -market_spread;
    let bet_home = if o.predicted_spread > model_line {
        true
    } else if o.predicted_spread < model_line {
        false
    } else {
        return None;
    };
    let cover = o.actual_margin() - model_line;
    if cover.abs() < PUSH_MARGIN {
        return Some(BetResult::Push);
    }
    Some(if (cover > 0.0) == bet_home {
        BetResult::Win
    } else {
        BetResult::Loss
    })
}

fn over_under_result(o: &ValidatedOutcome, market_total: f64) -> Option<BetResult> {
    let bet_over = if o.predicted_total > market_total {
        true
    } else if o.predicted_total < market_total {
        false
    } else {
        return None;
    };
    let diff = o.actual_total() - market_total;
    if diff.abs() < PUSH_MARGIN {
        return Some(BetResult::Push);
    }
    Some(if (diff > 0.0) == bet_over {
        BetResult::Win
    } else {
        BetResult::Loss
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn outcome(prob: f64, spread: f64, total: f64, home: i32, away: i32) -> ValidatedOutcome {
        ValidatedOutcome {
            id: None,
            event_id: "ev".into(),
            sport: "basketball".into(),
            predicted_home_win_prob: prob,
            predicted_spread: spread,
            predicted_total: total,
            home_score: home,
            away_score: away,
            market_spread: None,
            market_total: None,
            validated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_set_reports_zero_samples() {
        let r = evaluate(&[], &RecalibrationParams::passthrough());
        assert_eq!(r.samples, 0);
        assert_eq!(r.ats, Record::default());
    }

    #[test]
    fn brier_logloss_and_accuracy() {
        let outcomes = vec![
            outcome(0.8, 5.0, 210.0, 110, 100), // home wins, predicted home
            outcome(0.3, -4.0, 200.0, 95, 100), // away wins, predicted away
            outcome(0.6, 2.0, 220.0, 99, 104),  // away wins, predicted home
        ];
        let r = evaluate(&outcomes, &RecalibrationParams::passthrough());
        let brier = (0.2f64.powi(2) + 0.3f64.powi(2) + 0.6f64.powi(2)) / 3.0;
        assert_relative_eq!(r.brier_score, brier, epsilon = 1e-9);
        let ll = (-(0.8f64.ln()) - (0.7f64.ln()) - (0.4f64.ln())) / 3.0;
        assert_relative_eq!(r.log_loss, ll, epsilon = 1e-6);
        assert_relative_eq!(r.winner_accuracy, 2.0 / 3.0, epsilon = 1e-12);
        // |5-10| + |-4+5| + |2+5| = 13
        assert_relative_eq!(r.spread_mae, 13.0 / 3.0, epsilon = 1e-12);
        // |210-210| + |200-195| + |220-203| = 22
        assert_relative_eq!(r.total_mae, 22.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn certain_wrong_prediction_is_finite() {
        let r = evaluate(&[outcome(1.0, 5.0, 200.0, 90, 100)], &RecalibrationParams::passthrough());
        assert!(r.log_loss.is_finite());
        assert!(r.log_loss > 10.0);
    }

    #[test]
    fn ats_converts_market_sign_before_comparing() {
        // Market: home -3.5 → model line +3.5. Model expects home by 6 → bet home.
        let mut win = outcome(0.7, 6.0, 200.0, 105, 100);
        win.market_spread = Some(-3.5);
        // Home wins by 2: does not cover 3.5.
        let mut loss = outcome(0.7, 6.0, 200.0, 102, 100);
        loss.market_spread = Some(-3.5);
        // Model expects home by 1 → bet away; home wins by 2 → away +3.5 covers.
        let mut away_win = outcome(0.55, 1.0, 200.0, 102, 100);
        away_win.market_spread = Some(-3.5);
        // Home -3: wins by exactly 3 → push.
        let mut push = outcome(0.7, 6.0, 200.0, 103, 100);
        push.market_spread = Some(-3.0);
        // No line → not counted.
        let none = outcome(0.7, 6.0, 200.0, 103, 100);

        let r = evaluate(&[win, loss, away_win, push, none], &RecalibrationParams::passthrough());
        assert_eq!(
            r.ats,
            Record {
                wins: 2,
                losses: 1,
                pushes: 1
            }
        );
        assert_relative_eq!(r.ats.win_rate().unwrap(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn over_under_record() {
        let mut over_win = outcome(0.5, 0.0, 230.0, 120, 115);
        over_win.market_total = Some(220.5);
        let mut under_loss = outcome(0.5, 0.0, 210.0, 120, 115);
        under_loss.market_total = Some(220.5);
        let mut push = outcome(0.5, 0.0, 230.0, 110, 110);
        push.market_total = Some(220.0);
        let r = evaluate(&[over_win, under_loss, push], &RecalibrationParams::passthrough());
        assert_eq!(
            r.over_under,
            Record {
                wins: 1,
                losses: 1,
                pushes: 1
            }
        );
    }

    #[test]
    fn recalibration_changes_probability_metrics_only() {
        let outcomes = vec![
            outcome(0.9, 5.0, 210.0, 110, 100),
            outcome(0.9, 5.0, 210.0, 90, 100),
        ];
        let raw = evaluate(&outcomes, &RecalibrationParams::passthrough());
        let shrunk = evaluate(
            &outcomes,
            &RecalibrationParams {
                a: 0.5,
                b: 0.0,
                version: 3,
                samples: 2,
                fitted_at: None,
            },
        );
        assert_eq!(shrunk.calibration_version, 3);
        assert!(shrunk.log_loss < raw.log_loss);
        assert_relative_eq!(shrunk.spread_mae, raw.spread_mae);
        let cmp = compare(&raw, &shrunk);
        assert!(cmp.improves);
        assert!(cmp.log_loss_delta < 0.0);
        assert!(!compare(&shrunk, &raw).improves);
    }
}
