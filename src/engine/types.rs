use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bet market kinds the engine prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Moneyline,
    Spread,
    Total,
}

impl MarketType {
    /// Map a provider market key ("h2h", "spreads", "totals", ...) to a market type.
    pub fn from_key(key: &str) -> Option<MarketType> {
        match key.trim().to_lowercase().as_str() {
            "h2h" | "moneyline" | "ml" => Some(MarketType::Moneyline),
            "spreads" | "spread" | "handicap" => Some(MarketType::Spread),
            "totals" | "total" | "over_under" => Some(MarketType::Total),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketType::Moneyline => "moneyline",
            MarketType::Spread => "spread",
            MarketType::Total => "total",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Away,
    Home,
    Over,
    Under,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Away => Side::Home,
            Side::Home => Side::Away,
            Side::Over => Side::Under,
            Side::Under => Side::Over,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Away => "away",
            Side::Home => "home",
            Side::Over => "over",
            Side::Under => "under",
        }
    }
}

/// One outcome as listed by a sportsbook, before side resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub name: String,
    /// Decimal price.
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMarket {
    /// Provider market key, e.g. "h2h", "spreads", "totals".
    pub key: String,
    pub outcomes: Vec<RawOutcome>,
}

/// All markets a single bookmaker lists for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmakerOdds {
    pub bookmaker: String,
    pub markets: Vec<RawMarket>,
}

/// One sportsbook's price for one side of one market. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub bookmaker: String,
    pub market: MarketType,
    pub side: Side,
    pub decimal_price: f64,
    /// Spread (signed, negative = favourite) or total line.
    pub point: Option<f64>,
}

/// Score range from the simulation, low/high percentile bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub low: f64,
    pub high: f64,
}

/// How much the model knows about its own spread of outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Uncertainty {
    #[default]
    PointEstimateOnly,
    Simulated {
        /// Width of the 80% interval for the home margin.
        spread_ci_width: f64,
        /// Width of the 80% interval for the combined total.
        total_ci_width: f64,
        #[serde(default)]
        home_score: Option<ScoreRange>,
        #[serde(default)]
        away_score: Option<ScoreRange>,
    },
}

/// The model's output for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    /// Home score minus away score; positive means home is favoured.
    pub predicted_spread: f64,
    pub predicted_total: f64,
    /// Raw (uncalibrated) home win probability.
    pub home_win_probability: f64,
    /// 0-100.
    pub confidence: f64,
    #[serde(default)]
    pub uncertainty: Uncertainty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTier {
    High,
    Medium,
    Low,
}

impl ValueTier {
    pub fn from_edge(edge: f64) -> ValueTier {
        if edge > 0.10 {
            ValueTier::High
        } else if edge > 0.03 {
            ValueTier::Medium
        } else {
            ValueTier::Low
        }
    }
}

/// A candidate bet. Before consolidation `bookmakers` holds a single book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub market: MarketType,
    pub side: Side,
    pub point: Option<f64>,
    pub decimal_price: f64,
    pub american_odds: i32,
    pub implied_probability: f64,
    pub model_probability: f64,
    pub edge: f64,
    /// Expected value in percent of stake.
    pub expected_value: f64,
    /// 0-100, after uncertainty weighting and the sanity gate.
    pub confidence: u32,
    pub value_tier: ValueTier,
    pub rationale: String,
    pub warning: Option<String>,
    /// Display name: the single book, or "N books".
    pub bookmaker: String,
    pub bookmakers: Vec<String>,
    /// Suggested fraction of bankroll.
    pub kelly_stake: f64,
}

/// One event submitted for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    pub event_id: String,
    pub sport: String,
    pub away_team: String,
    pub home_team: String,
    #[serde(default)]
    pub commence_time: Option<DateTime<Utc>>,
    pub bookmakers: Vec<BookmakerOdds>,
    /// Falls back to the stored standing prediction when absent.
    #[serde(default)]
    pub prediction: Option<ModelPrediction>,
}

/// A finished event with the model's pre-game numbers, used for recalibration
/// fitting and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedOutcome {
    pub id: Option<i64>,
    pub event_id: String,
    pub sport: String,
    /// Raw model home win probability.
    pub predicted_home_win_prob: f64,
    /// Predicted home minus away (positive = home favoured).
    pub predicted_spread: f64,
    pub predicted_total: f64,
    pub home_score: i32,
    pub away_score: i32,
    /// Closing home spread in market convention (negative = home favoured).
    pub market_spread: Option<f64>,
    pub market_total: Option<f64>,
    pub validated_at: DateTime<Utc>,
}

impl ValidatedOutcome {
    pub fn home_won(&self) -> bool {
        self.home_score > self.away_score
    }

    pub fn actual_margin(&self) -> f64 {
        (self.home_score - self.away_score) as f64
    }

    pub fn actual_total(&self) -> f64 {
        (self.home_score + self.away_score) as f64
    }
}

/// Consensus market state for an event at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub id: Option<i64>,
    pub event_id: String,
    pub sport: String,
    pub captured_at: DateTime<Utc>,
    pub commence_time: DateTime<Utc>,
    /// Home spread in market convention.
    pub spread: Option<f64>,
    pub total: Option<f64>,
    /// Implied home win probability from the moneyline.
    pub home_implied_prob: Option<f64>,
    pub is_opening: bool,
    pub is_closing: bool,
}
