//! Line-movement monitoring and re-prediction decisions.
//!
//! Snapshots accumulate per event. The first one is the opening line; one
//! captured within the closing window before start is the closing line.
//! Persisting the marks is the database's job; everything here is pure.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::odds::implied_from_decimal;
use super::sport::MovementThreshold;
use super::types::{MarketQuote, MarketType, ModelPrediction, OddsSnapshot, Side};

/// A new prediction must move the spread by this much to replace the old one...
const SUPERSEDE_SPREAD_POINTS: f64 = 1.0;
/// ...or the confidence by this much.
const SUPERSEDE_CONFIDENCE_POINTS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub max_repredictions: u32,
    pub cooldown: Duration,
    /// No re-prediction this close to the start.
    pub start_cutoff: Duration,
    /// Snapshots this close to the start are closing lines.
    pub closing_window: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            max_repredictions: 3,
            cooldown: Duration::minutes(60),
            start_cutoff: Duration::minutes(30),
            closing_window: Duration::minutes(30),
        }
    }
}

impl MonitorSettings {
    /// Taken before the start, and no earlier than `closing_window` before it.
    pub fn is_closing_capture(&self, captured_at: DateTime<Utc>, commence_time: DateTime<Utc>) -> bool {
        let lead = commence_time - captured_at;
        lead >= Duration::zero() && lead <= self.closing_window
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMovement {
    pub event_id: String,
    pub opening_at: DateTime<Utc>,
    pub latest_at: DateTime<Utc>,
    /// Home spread change, latest minus opening.
    pub spread_move: Option<f64>,
    pub total_move: Option<f64>,
    /// Implied home probability change in percentage points.
    pub moneyline_move_pct: Option<f64>,
    /// Whether `latest` is the closing line.
    pub closed: bool,
}

impl LineMovement {
    pub fn between(opening: &OddsSnapshot, latest: &OddsSnapshot) -> Self {
        let diff = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(open), Some(now)) => Some(now - open),
            _ => None,
        };
        LineMovement {
            event_id: opening.event_id.clone(),
            opening_at: opening.captured_at,
            latest_at: latest.captured_at,
            spread_move: diff(opening.spread, latest.spread),
            total_move: diff(opening.total, latest.total),
            moneyline_move_pct: diff(opening.home_implied_prob, latest.home_implied_prob)
                .map(|d| d * 100.0),
            closed: latest.is_closing,
        }
    }

    /// Opening against closing when the event has closed, otherwise against
    /// the most recent snapshot.
    pub fn from_snapshots(snapshots: &[OddsSnapshot]) -> Option<Self> {
        let opening = snapshots
            .iter()
            .find(|s| s.is_opening)
            .or_else(|| snapshots.iter().min_by_key(|s| s.captured_at))?;
        let latest = snapshots
            .iter()
            .find(|s| s.is_closing)
            .or_else(|| snapshots.iter().max_by_key(|s| s.captured_at))?;
        Some(Self::between(opening, latest))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Significance {
    pub spread: bool,
    pub total: bool,
    pub moneyline: bool,
}

impl Significance {
    pub fn any(&self) -> bool {
        self.spread || self.total || self.moneyline
    }
}

pub fn significance(movement: &LineMovement, threshold: &MovementThreshold) -> Significance {
    let exceeds = |mv: Option<f64>, limit: f64| mv.is_some_and(|m| m.abs() > limit);
    Significance {
        spread: exceeds(movement.spread_move, threshold.spread),
        total: exceeds(movement.total_move, threshold.total),
        moneyline: exceeds(movement.moneyline_move_pct, threshold.moneyline_pct),
    }
}

/// Prior re-predictions for an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepredictionHistory {
    pub count: u32,
    pub last_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RepredictionDecision {
    Trigger,
    NotSignificant,
    LimitReached { count: u32 },
    CoolingDown { minutes_remaining: i64 },
    TooCloseToStart { minutes_to_start: i64 },
}

impl RepredictionDecision {
    pub fn should_repredict(&self) -> bool {
        matches!(self, RepredictionDecision::Trigger)
    }
}

pub fn decide_reprediction(
    significance: &Significance,
    history: &RepredictionHistory,
    commence_time: DateTime<Utc>,
    now: DateTime<Utc>,
    settings: &MonitorSettings,
) -> RepredictionDecision {
    if !significance.any() {
        return RepredictionDecision::NotSignificant;
    }
    if history.count >= settings.max_repredictions {
        return RepredictionDecision::LimitReached {
            count: history.count,
        };
    }
    if let Some(last) = history.last_at {
        let elapsed = now - last;
        if elapsed < settings.cooldown {
            return RepredictionDecision::CoolingDown {
                minutes_remaining: (settings.cooldown - elapsed).num_minutes().max(1),
            };
        }
    }
    let to_start = commence_time - now;
    if to_start <= settings.start_cutoff {
        return RepredictionDecision::TooCloseToStart {
            minutes_to_start: to_start.num_minutes(),
        };
    }
    RepredictionDecision::Trigger
}

/// Whether `new` is different enough to replace `standing`.
pub fn materially_differs(standing: &ModelPrediction, new: &ModelPrediction) -> bool {
    (new.predicted_spread - standing.predicted_spread).abs() >= SUPERSEDE_SPREAD_POINTS
        || (new.confidence - standing.confidence).abs() >= SUPERSEDE_CONFIDENCE_POINTS
}

/// Build a consensus snapshot from quotes across books: median home spread,
/// median total and the mean vig-free home probability.
pub fn consensus_snapshot(
    event_id: &str,
    sport: &str,
    captured_at: DateTime<Utc>,
    commence_time: DateTime<Utc>,
    quotes: &[MarketQuote],
) -> OddsSnapshot {
    let spreads: Vec<f64> = quotes
        .iter()
        .filter(|q| q.market == MarketType::Spread && q.side == Side::Home)
        .filter_map(|q| q.point)
        .collect();
    let totals: Vec<f64> = quotes
        .iter()
        .filter(|q| q.market == MarketType::Total && q.side == Side::Over)
        .filter_map(|q| q.point)
        .collect();

    let mut by_book: HashMap<&str, (Option<f64>, Option<f64>)> = HashMap::new();
    for q in quotes.iter().filter(|q| q.market == MarketType::Moneyline) {
        let entry = by_book.entry(q.bookmaker.as_str()).or_default();
        match q.side {
            Side::Home => entry.1 = Some(implied_from_decimal(q.decimal_price)),
            Side::Away => entry.0 = Some(implied_from_decimal(q.decimal_price)),
            _ => {}
        }
    }
    let fair: Vec<f64> = by_book
        .values()
        .filter_map(|(away, home)| match (away, home) {
            (Some(a), Some(h)) if a + h > 0.0 => Some(h / (a + h)),
            _ => None,
        })
        .collect();

    OddsSnapshot {
        id: None,
        event_id: event_id.to_string(),
        sport: sport.to_string(),
        captured_at,
        commence_time,
        spread: median(spreads),
        total: median(totals),
        home_implied_prob: (!fair.is_empty()).then(|| fair.iter().sum::<f64>() / fair.len() as f64),
        is_opening: false,
        is_closing: false,
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
