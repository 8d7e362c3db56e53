//! Turn raw bookmaker listings into side-resolved `MarketQuote`s.
//!
//! Bad quotes are reported and skipped one at a time; the rest of the event
//! is still analysed.

use thiserror::Error;
use tracing::{debug, warn};

use super::matching::{is_draw_label, normalize_text, MatchConfidence, MatchResult, TeamMatcher};
use super::types::{BookmakerOdds, MarketQuote, MarketType};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("{bookmaker}: invalid decimal price {price} for '{label}'")]
    InvalidPrice {
        bookmaker: String,
        label: String,
        price: f64,
    },
    #[error("{bookmaker}: {market} outcome '{label}' has no point")]
    MissingPoint {
        bookmaker: String,
        market: &'static str,
        label: String,
    },
    #[error("{bookmaker}: unsupported market '{key}'")]
    UnknownMarket { bookmaker: String, key: String },
    #[error("{bookmaker}: could not place {market} outcome '{label}'")]
    UnmatchedOutcome {
        bookmaker: String,
        market: &'static str,
        label: String,
    },
    #[error("{bookmaker}: {market} suppressed ({reason})")]
    SuppressedMatch {
        bookmaker: String,
        market: &'static str,
        reason: &'static str,
    },
}

/// What the caller wants done with weak matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Drop markets matched only with low confidence.
    pub suppress_low_confidence: bool,
    /// Drop markets flagged as a potential reversal.
    pub skip_potential_reversals: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            suppress_low_confidence: false,
            skip_potential_reversals: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedOdds {
    pub quotes: Vec<MarketQuote>,
    pub matches: Vec<MatchResult>,
    pub skipped: Vec<QuoteError>,
}

pub fn normalize_event(
    away_team: &str,
    home_team: &str,
    bookmakers: &[BookmakerOdds],
    options: NormalizeOptions,
) -> NormalizedOdds {
    let matcher = TeamMatcher::new(away_team, home_team);
    let mut out = NormalizedOdds::default();

    for book in bookmakers {
        let result = matcher.match_bookmaker(book);
        for raw in &book.markets {
            let Some(market) = MarketType::from_key(&raw.key) else {
                out.skipped.push(QuoteError::UnknownMarket {
                    bookmaker: book.bookmaker.clone(),
                    key: raw.key.clone(),
                });
                continue;
            };
            let Some(matched) = result.market(market) else {
                continue;
            };

            if options.skip_potential_reversals && matched.potential_reversal() {
                out.skipped.push(QuoteError::SuppressedMatch {
                    bookmaker: book.bookmaker.clone(),
                    market: market.label(),
                    reason: "potential reversal",
                });
                continue;
            }
            if options.suppress_low_confidence && matched.confidence == MatchConfidence::Low {
                out.skipped.push(QuoteError::SuppressedMatch {
                    bookmaker: book.bookmaker.clone(),
                    market: market.label(),
                    reason: "low match confidence",
                });
                continue;
            }

            for (outcome, side) in raw.outcomes.iter().zip(&matched.sides) {
                let Some(side) = *side else {
                    if is_draw_label(&normalize_text(&outcome.name)) {
                        debug!("{}: skipping draw outcome", book.bookmaker);
                    } else {
                        out.skipped.push(QuoteError::UnmatchedOutcome {
                            bookmaker: book.bookmaker.clone(),
                            market: market.label(),
                            label: outcome.name.clone(),
                        });
                    }
                    continue;
                };
                if !outcome.price.is_finite() || outcome.price <= 1.0 {
                    out.skipped.push(QuoteError::InvalidPrice {
                        bookmaker: book.bookmaker.clone(),
                        label: outcome.name.clone(),
                        price: outcome.price,
                    });
                    continue;
                }
                let point = outcome.point.filter(|p| p.is_finite());
                if market != MarketType::Moneyline && point.is_none() {
                    out.skipped.push(QuoteError::MissingPoint {
                        bookmaker: book.bookmaker.clone(),
                        market: market.label(),
                        label: outcome.name.clone(),
                    });
                    continue;
                }
                out.quotes.push(MarketQuote {
                    bookmaker: book.bookmaker.clone(),
                    market,
                    side,
                    decimal_price: outcome.price,
                    point: if market == MarketType::Moneyline { None } else { point },
                });
            }
        }
        out.matches.push(result);
    }

    for err in &out.skipped {
        warn!("Skipping quote: {}", err);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{RawMarket, RawOutcome, Side};

    fn outcome(name: &str, price: f64, point: Option<f64>) -> RawOutcome {
        RawOutcome {
            name: name.into(),
            price,
            point,
        }
    }

    fn book(name: &str, markets: Vec<RawMarket>) -> BookmakerOdds {
        BookmakerOdds {
            bookmaker: name.into(),
            markets,
        }
    }

    fn market(key: &str, outcomes: Vec<RawOutcome>) -> RawMarket {
        RawMarket {
            key: key.into(),
            outcomes,
        }
    }

    #[test]
    fn resolves_all_three_markets() {
        let books = vec![book(
            "fanduel",
            vec![
                market("h2h", vec![outcome("Miami Heat", 2.2, None), outcome("Boston Celtics", 1.7, None)]),
                market(
                    "spreads",
                    vec![outcome("Miami Heat", 1.91, Some(4.5)), outcome("Boston Celtics", 1.91, Some(-4.5))],
                ),
                market("totals", vec![outcome("Over", 1.95, Some(221.5)), outcome("Under", 1.87, Some(221.5))]),
            ],
        )];
        let n = normalize_event("Miami Heat", "Boston Celtics", &books, NormalizeOptions::default());
        assert_eq!(n.quotes.len(), 6);
        assert!(n.skipped.is_empty());
        let home_spread = n
            .quotes
            .iter()
            .find(|q| q.market == MarketType::Spread && q.side == Side::Home)
            .unwrap();
        assert_eq!(home_spread.point, Some(-4.5));
        assert_eq!(n.matches.len(), 1);
    }

    #[test]
    fn malformed_price_skips_only_that_quote() {
        let books = vec![book(
            "book",
            vec![market("h2h", vec![outcome("Miami Heat", 0.5, None), outcome("Boston Celtics", 1.7, None)])],
        )];
        let n = normalize_event("Miami Heat", "Boston Celtics", &books, NormalizeOptions::default());
        assert_eq!(n.quotes.len(), 1);
        assert_eq!(n.quotes[0].side, Side::Home);
        assert!(matches!(n.skipped[0], QuoteError::InvalidPrice { price, .. } if price == 0.5));
    }

    #[test]
    fn spread_without_point_is_skipped() {
        let books = vec![book(
            "book",
            vec![market(
                "spreads",
                vec![outcome("Miami Heat", 1.91, None), outcome("Boston Celtics", 1.91, Some(-2.5))],
            )],
        )];
        let n = normalize_event("Miami Heat", "Boston Celtics", &books, NormalizeOptions::default());
        assert_eq!(n.quotes.len(), 1);
        assert!(matches!(n.skipped[0], QuoteError::MissingPoint { .. }));
    }

    #[test]
    fn potential_reversal_is_dropped_by_default_and_kept_on_request() {
        let books = vec![book(
            "book",
            vec![market("h2h", vec![outcome("MIA", 1.08, None), outcome("BOS", 9.0, None)])],
        )];
        let n = normalize_event("Miami Heat", "Boston Celtics", &books, NormalizeOptions::default());
        assert!(n.quotes.is_empty());
        assert!(matches!(n.skipped[0], QuoteError::SuppressedMatch { reason: "potential reversal", .. }));

        let keep = NormalizeOptions {
            suppress_low_confidence: false,
            skip_potential_reversals: false,
        };
        let n = normalize_event("Miami Heat", "Boston Celtics", &books, keep);
        assert_eq!(n.quotes.len(), 2);
        assert!(n.matches[0].warnings.iter().any(|w| w.contains("potential reversal")));
    }

    #[test]
    fn low_confidence_suppression_is_optional() {
        let books = vec![book(
            "book",
            vec![market("h2h", vec![outcome("Team 1", 1.9, None), outcome("Team 2", 1.9, None)])],
        )];
        let kept = normalize_event("Miami Heat", "Boston Celtics", &books, NormalizeOptions::default());
        assert_eq!(kept.quotes.len(), 2);
        let strict = NormalizeOptions {
            suppress_low_confidence: true,
            skip_potential_reversals: true,
        };
        let dropped = normalize_event("Miami Heat", "Boston Celtics", &books, strict);
        assert!(dropped.quotes.is_empty());
    }

    #[test]
    fn unsupported_market_is_reported() {
        let books = vec![book("book", vec![market("player_points", vec![])])];
        let n = normalize_event("A", "B", &books, NormalizeOptions::default());
        assert!(matches!(n.skipped[0], QuoteError::UnknownMarket { .. }));
    }
}
