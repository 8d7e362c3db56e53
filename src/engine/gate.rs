//! Moneyline sanity gate against large contrarian edges.
//!
//! A big probability gap against a heavy market consensus is more likely a
//! model blind spot than a market inefficiency. The gate discounts the
//! presented confidence; it never drops the bet.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateBand {
    Pass,
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub band: GateBand,
    pub confidence: u32,
    pub warning: Option<String>,
}

struct Band {
    max_implied: f64,
    min_edge: f64,
    factor: f64,
    floor: u32,
}

const HARD: Band = Band {
    max_implied: 0.15,
    min_edge: 0.25,
    factor: 0.6,
    floor: 40,
};

const SOFT: Band = Band {
    max_implied: 0.20,
    min_edge: 0.20,
    factor: 0.75,
    floor: 50,
};

fn discount(confidence: u32, band: &Band) -> u32 {
    let scaled = (confidence as f64 * band.factor).round() as u32;
    // The floor limits the discount; it never lifts a lower confidence.
    scaled.max(band.floor).min(confidence)
}

/// Apply the gate to a moneyline bet.
///
/// In a band the confidence becomes `max(floor, round(c × factor))` capped at
/// `c`, so a confidence already below the floor (40 hard, 50 soft) is kept
/// as is rather than raised to the floor.
pub fn disagreement_gate(implied_prob: f64, edge: f64, confidence: u32) -> GateOutcome {
    if implied_prob < HARD.max_implied && edge > HARD.min_edge {
        return GateOutcome {
            band: GateBand::Hard,
            confidence: discount(confidence, &HARD),
            warning: Some(format!(
                "Market gives this side {:.0}% but the model says {:.0}%; a gap this large against \
                 consensus usually means missing information",
                implied_prob * 100.0,
                (implied_prob + edge) * 100.0
            )),
        };
    }
    if implied_prob < SOFT.max_implied && edge > SOFT.min_edge {
        return GateOutcome {
            band: GateBand::Soft,
            confidence: discount(confidence, &SOFT),
            warning: None,
        };
    }
    GateOutcome {
        band: GateBand::Pass,
        confidence,
        warning: None,
    }
}
