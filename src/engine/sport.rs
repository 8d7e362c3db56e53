//! Per-sport tuning tables.
//!
//! Every sport maps to one [`SportProfile`]. Unknown sport keys resolve to
//! [`Sport::Other`], whose profile carries conservative defaults, so there is
//! never a silent string-lookup miss.

use serde::{Deserialize, Serialize};

/// Sports the engine has explicit tuning for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Basketball,
    CollegeBasketball,
    AmericanFootball,
    CollegeFootball,
    IceHockey,
    Baseball,
    Soccer,
    Other,
}

/// Width thresholds for a simulated 80% confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CiThreshold {
    /// Widths at or below this carry no penalty.
    pub acceptable: f64,
    /// Widths at or above this get the floor multiplier.
    pub filter: f64,
}

/// Minimum line move that counts as significant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementThreshold {
    /// Spread points.
    pub spread: f64,
    /// Total points.
    pub total: f64,
    /// Change in implied home win probability, in percentage points.
    pub moneyline_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SportProfile {
    pub spread_ci: CiThreshold,
    pub total_ci: CiThreshold,
    /// Scale of the tanh cover approximation for spreads.
    pub spread_std_dev: f64,
    /// Scale of the tanh approximation for totals.
    pub total_std_dev: f64,
    pub movement: MovementThreshold,
}

impl Sport {
    /// Parse a provider sport key ("nba", "basketball_nba", "icehockey_nhl", ...).
    pub fn from_key(key: &str) -> Sport {
        let k = key.trim().to_lowercase();
        match k.as_str() {
            "basketball" | "nba" | "basketball_nba" | "wnba" | "basketball_wnba" => {
                Sport::Basketball
            }
            "ncaab" | "basketball_ncaab" | "college_basketball" => Sport::CollegeBasketball,
            "american_football" | "nfl" | "americanfootball_nfl" => Sport::AmericanFootball,
            "ncaaf" | "americanfootball_ncaaf" | "college_football" => Sport::CollegeFootball,
            "ice_hockey" | "hockey" | "nhl" | "icehockey_nhl" => Sport::IceHockey,
            "baseball" | "mlb" | "baseball_mlb" => Sport::Baseball,
            "soccer" | "football" | "football_eu" | "mls" | "epl" => Sport::Soccer,
            other if other.starts_with("soccer_") => Sport::Soccer,
            _ => Sport::Other,
        }
    }

    pub fn profile(self) -> SportProfile {
        match self {
            Sport::Basketball => SportProfile {
                spread_ci: CiThreshold { acceptable: 12.0, filter: 26.0 },
                total_ci: CiThreshold { acceptable: 18.0, filter: 36.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 2.0, total: 3.0, moneyline_pct: 5.0 },
            },
            Sport::CollegeBasketball => SportProfile {
                spread_ci: CiThreshold { acceptable: 14.0, filter: 28.0 },
                total_ci: CiThreshold { acceptable: 20.0, filter: 40.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 2.0, total: 3.0, moneyline_pct: 5.0 },
            },
            Sport::AmericanFootball => SportProfile {
                spread_ci: CiThreshold { acceptable: 14.0, filter: 28.0 },
                total_ci: CiThreshold { acceptable: 16.0, filter: 32.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 1.5, total: 2.0, moneyline_pct: 5.0 },
            },
            Sport::CollegeFootball => SportProfile {
                spread_ci: CiThreshold { acceptable: 17.0, filter: 34.0 },
                total_ci: CiThreshold { acceptable: 20.0, filter: 40.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 2.0, total: 3.0, moneyline_pct: 5.0 },
            },
            Sport::IceHockey => SportProfile {
                spread_ci: CiThreshold { acceptable: 1.5, filter: 3.5 },
                total_ci: CiThreshold { acceptable: 2.0, filter: 4.5 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 0.5, total: 0.5, moneyline_pct: 5.0 },
            },
            Sport::Baseball => SportProfile {
                spread_ci: CiThreshold { acceptable: 2.0, filter: 4.5 },
                total_ci: CiThreshold { acceptable: 3.0, filter: 6.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 0.5, total: 1.0, moneyline_pct: 5.0 },
            },
            Sport::Soccer => SportProfile {
                spread_ci: CiThreshold { acceptable: 1.5, filter: 3.0 },
                total_ci: CiThreshold { acceptable: 2.0, filter: 4.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 0.5, total: 0.5, moneyline_pct: 5.0 },
            },
            Sport::Other => SportProfile {
                spread_ci: CiThreshold { acceptable: 10.0, filter: 20.0 },
                total_ci: CiThreshold { acceptable: 15.0, filter: 30.0 },
                spread_std_dev: 10.0,
                total_std_dev: 10.0,
                movement: MovementThreshold { spread: 2.0, total: 2.0, moneyline_pct: 5.0 },
            },
        }
    }
}
