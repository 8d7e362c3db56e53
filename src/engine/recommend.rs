//! Per-event pipeline: normalize quotes, price every side against the model,
//! weight and gate confidence, then consolidate across books.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::calibration::RecalibrationParams;
use super::consolidate::{admit, consolidate};
use super::gate::disagreement_gate;
use super::kelly::kelly_stake;
use super::matching::MatchResult;
use super::normalize::{normalize_event, NormalizeOptions};
use super::odds::{decimal_to_american, edge, expected_value_pct, implied_from_decimal, PredictedMargin};
use super::sport::{Sport, SportProfile};
use super::types::{EventInput, MarketQuote, MarketType, ModelPrediction, Recommendation, Side, ValueTier};
use super::uncertainty::{uncertainty_multiplier, weight_confidence};

/// Weight of the edge term in the confidence blend; the rest is model confidence.
const EDGE_WEIGHT: f64 = 0.4;
/// An edge of 0.5 maps to a full 100 on the edge scale.
const EDGE_SCALE: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Candidate admission edge for every market.
    pub min_edge: f64,
    /// Final admission for spread and total bets.
    pub min_confidence: u32,
    pub kelly_fraction: f64,
    pub normalize: NormalizeOptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            min_edge: 0.02,
            min_confidence: 45,
            kelly_fraction: 0.25,
            normalize: NormalizeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("event {event_id}: invalid prediction ({reason})")]
    InvalidPrediction { event_id: String, reason: String },
    #[error("event {event_id}: no prediction available")]
    MissingPrediction { event_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub event_id: String,
    pub sport: Sport,
    pub calibration_version: i64,
    pub calibrated_home_win_prob: f64,
    pub recommendations: Vec<Recommendation>,
    pub matches: Vec<MatchResult>,
    /// Quotes dropped for data-quality reasons.
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

/// Analyse one event. Uses `input.prediction` when present, else `fallback`.
pub fn analyze_event(
    input: &EventInput,
    fallback: Option<&ModelPrediction>,
    params: &RecalibrationParams,
    settings: &EngineSettings,
) -> Result<EventAnalysis, AnalysisError> {
    let prediction = input
        .prediction
        .as_ref()
        .or(fallback)
        .ok_or_else(|| AnalysisError::MissingPrediction {
            event_id: input.event_id.clone(),
        })?;
    validate_prediction(&input.event_id, prediction)?;

    let sport = Sport::from_key(&input.sport);
    let profile = sport.profile();
    let normalized = normalize_event(
        &input.away_team,
        &input.home_team,
        &input.bookmakers,
        settings.normalize,
    );

    let pricer = Pricer::new(prediction, &profile, params, settings);
    let mut warnings = Vec::new();
    if let Some(w) = pricer.consistency_warning() {
        warnings.push(w);
    }

    let candidates: Vec<Recommendation> = normalized
        .quotes
        .iter()
        .filter_map(|q| pricer.candidate(q))
        .collect();
    debug!(
        "{}: {} quotes → {} candidates",
        input.event_id,
        normalized.quotes.len(),
        candidates.len()
    );

    let recommendations = admit(consolidate(candidates), settings.min_confidence);
    info!(
        "{}: {} recommendation(s) (calibration v{})",
        input.event_id,
        recommendations.len(),
        params.version
    );

    Ok(EventAnalysis {
        event_id: input.event_id.clone(),
        sport,
        calibration_version: params.version,
        calibrated_home_win_prob: pricer.home_prob,
        recommendations,
        matches: normalized.matches,
        skipped: normalized.skipped.iter().map(ToString::to_string).collect(),
        warnings,
    })
}

fn validate_prediction(event_id: &str, p: &ModelPrediction) -> Result<(), AnalysisError> {
    let reason = if !(0.0..=1.0).contains(&p.home_win_probability) {
        Some(format!("home win probability {} outside [0, 1]", p.home_win_probability))
    } else if !(0.0..=100.0).contains(&p.confidence) {
        Some(format!("confidence {} outside [0, 100]", p.confidence))
    } else if !p.predicted_spread.is_finite() || !p.predicted_total.is_finite() {
        Some("non-finite predicted score".to_string())
    } else {
        None
    };
    match reason {
        Some(reason) => Err(AnalysisError::InvalidPrediction {
            event_id: event_id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Everything needed to price a quote for one event.
struct Pricer<'a> {
    prediction: &'a ModelPrediction,
    profile: &'a SportProfile,
    settings: &'a EngineSettings,
    margin: PredictedMargin,
    /// Recalibrated home win probability.
    home_prob: f64,
}

impl<'a> Pricer<'a> {
    fn new(
        prediction: &'a ModelPrediction,
        profile: &'a SportProfile,
        params: &RecalibrationParams,
        settings: &'a EngineSettings,
    ) -> Self {
        Pricer {
            prediction,
            profile,
            settings,
            margin: PredictedMargin::new(prediction, profile),
            home_prob: params.apply(prediction.home_win_probability),
        }
    }

    fn model_probability(&self, quote: &MarketQuote) -> Option<f64> {
        match (quote.market, quote.side) {
            // Only on a side the shared margin has winning, so no moneyline bet
            // can oppose a spread bet priced off the same margin.
            (MarketType::Moneyline, side @ (Side::Home | Side::Away)) => {
                (self.margin.win_probability(side) >= 0.5).then(|| self.outright(side))
            }
            (MarketType::Spread, side @ (Side::Home | Side::Away)) => {
                Some(self.margin.cover_probability(side, quote.point?))
            }
            (MarketType::Total, side @ (Side::Over | Side::Under)) => {
                Some(self.margin.total_probability(side, quote.point?))
            }
            _ => None,
        }
    }

    /// Recalibrated outright win probability for a team side.
    fn outright(&self, side: Side) -> f64 {
        match side {
            Side::Away => 1.0 - self.home_prob,
            _ => self.home_prob,
        }
    }

    /// The model's outright probability and its margin should favour the same side.
    fn consistency_warning(&self) -> Option<String> {
        let margin_home = self.margin.win_probability(Side::Home);
        let disagree = (margin_home - 0.5) * (self.home_prob - 0.5) < 0.0;
        (disagree && (self.home_prob - 0.5).abs() > 0.05 && self.margin.margin.abs() >= 1.0).then(|| {
            format!(
                "Model win probability ({:.1}% home) and predicted margin ({:+.1}) favour different sides; \
                 moneyline bets against the margin are withheld",
                self.home_prob * 100.0,
                self.margin.margin
            )
        })
    }

    fn candidate(&self, quote: &MarketQuote) -> Option<Recommendation> {
        let model_prob = self.model_probability(quote)?;
        let implied = implied_from_decimal(quote.decimal_price);
        let bet_edge = edge(model_prob, implied);
        if bet_edge <= self.settings.min_edge {
            return None;
        }

        let base = blended_confidence(bet_edge, self.prediction.confidence);
        let (confidence, warning, note) = match quote.market {
            MarketType::Moneyline => {
                let gate = disagreement_gate(implied, bet_edge, base);
                (gate.confidence, gate.warning, None)
            }
            MarketType::Spread | MarketType::Total => {
                let m = uncertainty_multiplier(&self.prediction.uncertainty, quote.market, self.profile);
                let note = (m < 1.0)
                    .then(|| format!("confidence scaled x{:.2} for a wide simulated range", m));
                (weight_confidence(base, m), None, note)
            }
        };

        let mut rationale = self.describe(quote, model_prob, implied, bet_edge);
        if let Some(note) = note {
            rationale.push_str("; ");
            rationale.push_str(&note);
        }

        Some(Recommendation {
            market: quote.market,
            side: quote.side,
            point: quote.point,
            decimal_price: quote.decimal_price,
            american_odds: decimal_to_american(quote.decimal_price),
            implied_probability: implied,
            model_probability: model_prob,
            edge: bet_edge,
            expected_value: expected_value_pct(model_prob, implied),
            confidence,
            value_tier: ValueTier::from_edge(bet_edge),
            rationale,
            warning,
            bookmaker: quote.bookmaker.clone(),
            bookmakers: vec![quote.bookmaker.clone()],
            kelly_stake: kelly_stake(model_prob, quote.decimal_price, self.settings.kelly_fraction),
        })
    }

    fn describe(&self, quote: &MarketQuote, model_prob: f64, implied: f64, bet_edge: f64) -> String {
        let gap = format!(
            "model {:.1}% vs market {:.1}% ({:+.1} pts)",
            model_prob * 100.0,
            implied * 100.0,
            bet_edge * 100.0
        );
        match (quote.market, quote.point) {
            (MarketType::Spread, Some(point)) => format!(
                "Projected home margin {:+.1}; {} {:+.1} covers: {}",
                self.margin.margin,
                quote.side.label(),
                point,
                gap
            ),
            (MarketType::Total, Some(line)) => format!(
                "Projected total {:.1}; {} {:.1}: {}",
                self.margin.total,
                quote.side.label(),
                line,
                gap
            ),
            _ => format!("{} to win: {}", quote.side.label(), gap),
        }
    }
}

/// `round(min(edge × 200, 100) × 0.4 + model_confidence × 0.6)`.
pub fn blended_confidence(bet_edge: f64, model_confidence: f64) -> u32 {
    let edge_score = (bet_edge * EDGE_SCALE).min(100.0);
    (edge_score * EDGE_WEIGHT + model_confidence * (1.0 - EDGE_WEIGHT))
        .round()
        .clamp(0.0, 100.0) as u32
}
