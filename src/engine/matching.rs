//! Resolve sportsbook outcome labels to canonical away/home (or over/under) sides.
//!
//! Strategy, in order:
//! 1. exact or substring match against name variants of each canonical team
//!    (full name, first two tokens, last token, first token), strongest first;
//! 2. inference of the second side when only one label resolves;
//! 3. positional fallback (first listed = away, second = home), low confidence.
//!
//! Ambiguity is never an error. It lowers the confidence and adds warnings so
//! the caller can decide whether to suppress the match.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::types::{BookmakerOdds, MarketType, RawOutcome, Side};

/// Odds ratio above which a low-confidence match is suspected to be reversed.
const REVERSAL_ODDS_RATIO: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Every label equals a canonical full name.
    Exact,
    /// Labels matched through name variants.
    NameVariant,
    /// One label matched, the other took the remaining side.
    Inferred,
    /// Listing order: first = away, second = home.
    Positional,
    /// Over/under labels.
    Direction,
    /// Nothing could be resolved.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchWarning {
    PositionalFallback { market: MarketType },
    InferredSide { market: MarketType, label: String },
    PotentialReversal { market: MarketType, odds_ratio: f64 },
    UnmirroredSpread { away_point: f64, home_point: f64 },
    FavoriteMismatch { moneyline_favorite: Side, spread_favorite: Side },
    UnrecognizedLabel { market: MarketType, label: String },
    Unresolved { market: MarketType, outcomes: usize },
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchWarning::PositionalFallback { market } => {
                write!(f, "{}: no name matched, sides assigned by listing order", market.label())
            }
            MatchWarning::InferredSide { market, label } => {
                write!(f, "{}: side for '{}' inferred from the other outcome", market.label(), label)
            }
            MatchWarning::PotentialReversal { market, odds_ratio } => write!(
                f,
                "{}: potential reversal, low-confidence match with odds ratio {:.1}x",
                market.label(),
                odds_ratio
            ),
            MatchWarning::UnmirroredSpread { away_point, home_point } => write!(
                f,
                "spread: points not mirrored (away {:+.1}, home {:+.1})",
                away_point, home_point
            ),
            MatchWarning::FavoriteMismatch { moneyline_favorite, spread_favorite } => write!(
                f,
                "moneyline favours {} but spread favours {}",
                moneyline_favorite.label(),
                spread_favorite.label()
            ),
            MatchWarning::UnrecognizedLabel { market, label } => {
                write!(f, "{}: unrecognized outcome '{}'", market.label(), label)
            }
            MatchWarning::Unresolved { market, outcomes } => {
                write!(f, "{}: could not resolve {} outcome(s)", market.label(), outcomes)
            }
        }
    }
}

/// Side resolution for one market of one bookmaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMatch {
    pub market: MarketType,
    /// Resolved side per outcome, aligned with the bookmaker's listing.
    /// `None` for draws and labels that could not be placed.
    pub sides: Vec<Option<Side>>,
    pub confidence: MatchConfidence,
    pub method: MatchMethod,
    pub warnings: Vec<MatchWarning>,
    /// Sum of implied probabilities across listed outcomes.
    pub overround: Option<f64>,
}

impl MarketMatch {
    pub fn potential_reversal(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, MatchWarning::PotentialReversal { .. }))
    }
}

/// Matching output for one (event, bookmaker) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub bookmaker: String,
    pub markets: Vec<MarketMatch>,
    /// Weakest confidence across markets.
    pub confidence: MatchConfidence,
    /// Every market warning plus cross-market ones.
    pub warnings: Vec<String>,
}

impl MatchResult {
    pub fn market(&self, market: MarketType) -> Option<&MarketMatch> {
        self.markets.iter().find(|m| m.market == market)
    }
}

/// Canonical names of the two teams of an event.
#[derive(Debug, Clone)]
pub struct TeamMatcher {
    away: TeamVariants,
    home: TeamVariants,
}

#[derive(Debug, Clone)]
struct TeamVariants {
    full: String,
    /// (normalized variant, priority); higher priority is more specific.
    variants: Vec<(String, u8)>,
}

impl TeamVariants {
    fn new(name: &str) -> Self {
        let full = normalize_text(name);
        let tokens: Vec<&str> = full.split_whitespace().collect();
        let mut variants: Vec<(String, u8)> = Vec::new();
        if !full.is_empty() {
            variants.push((full.clone(), 4));
        }
        if tokens.len() > 2 {
            variants.push((tokens[..2].join(" "), 3));
        }
        if tokens.len() > 1 {
            if let Some(last) = tokens.last() {
                variants.push((last.to_string(), 2));
            }
            variants.push((tokens[0].to_string(), 1));
        }
        TeamVariants { full, variants }
    }

    /// Strongest variant priority matching `label`, 0 when none does.
    fn score(&self, label: &str) -> u8 {
        self.variants
            .iter()
            .filter(|(variant, _)| contains_words(label, variant) || contains_words(variant, label))
            .map(|(_, priority)| *priority)
            .max()
            .unwrap_or(0)
    }
}

impl TeamMatcher {
    pub fn new(away_team: &str, home_team: &str) -> Self {
        TeamMatcher {
            away: TeamVariants::new(away_team),
            home: TeamVariants::new(home_team),
        }
    }

    /// Resolve every market a bookmaker lists for the event.
    pub fn match_bookmaker(&self, odds: &BookmakerOdds) -> MatchResult {
        let mut markets = Vec::new();
        for raw in &odds.markets {
            let Some(market) = MarketType::from_key(&raw.key) else {
                debug!("{}: ignoring unsupported market '{}'", odds.bookmaker, raw.key);
                continue;
            };
            markets.push(self.match_market(market, &raw.outcomes));
        }

        let mut warnings: Vec<String> = markets
            .iter()
            .flat_map(|m| m.warnings.iter().map(ToString::to_string))
            .collect();
        if let Some(w) = favorite_mismatch(odds, &markets) {
            warnings.push(w.to_string());
        }

        let confidence = markets
            .iter()
            .map(|m| m.confidence)
            .min()
            .unwrap_or(MatchConfidence::Low);

        MatchResult {
            bookmaker: odds.bookmaker.clone(),
            markets,
            confidence,
            warnings,
        }
    }

    /// Resolve the outcomes of a single market.
    pub fn match_market(&self, market: MarketType, outcomes: &[RawOutcome]) -> MarketMatch {
        let overround = overround(outcomes);
        if market == MarketType::Total {
            return match_totals(outcomes, overround);
        }

        let labels: Vec<String> = outcomes.iter().map(|o| normalize_text(&o.name)).collect();
        let team_idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| !is_draw_label(l))
            .map(|(i, _)| i)
            .collect();

        let mut sides: Vec<Option<Side>> = vec![None; outcomes.len()];
        let mut all_exact = true;
        for &i in &team_idx {
            let label = &labels[i];
            let away = self.away.score(label);
            let home = self.home.score(label);
            sides[i] = match away.cmp(&home) {
                std::cmp::Ordering::Greater => Some(Side::Away),
                std::cmp::Ordering::Less => Some(Side::Home),
                std::cmp::Ordering::Equal => None,
            };
            if *label != self.away.full && *label != self.home.full {
                all_exact = false;
            }
        }

        let resolved: Vec<Side> = team_idx.iter().filter_map(|&i| sides[i]).collect();
        let distinct = resolved.len() == 2 && resolved[0] != resolved[1];
        let mut warnings = Vec::new();

        let (confidence, method) = if team_idx.len() == 2 && distinct {
            if all_exact {
                (MatchConfidence::High, MatchMethod::Exact)
            } else {
                (MatchConfidence::Medium, MatchMethod::NameVariant)
            }
        } else if team_idx.len() == 2 && resolved.len() == 1 {
            let known = resolved[0];
            let missing = team_idx
                .iter()
                .copied()
                .find(|&i| sides[i].is_none())
                .unwrap_or(team_idx[1]);
            sides[missing] = Some(known.opposite());
            warnings.push(MatchWarning::InferredSide {
                market,
                label: outcomes[missing].name.clone(),
            });
            (MatchConfidence::Medium, MatchMethod::Inferred)
        } else if team_idx.len() == 2 {
            debug!(
                "{}: falling back to listing order for '{}' / '{}'",
                market.label(),
                outcomes[team_idx[0]].name,
                outcomes[team_idx[1]].name
            );
            sides[team_idx[0]] = Some(Side::Away);
            sides[team_idx[1]] = Some(Side::Home);
            warnings.push(MatchWarning::PositionalFallback { market });
            (MatchConfidence::Low, MatchMethod::Positional)
        } else {
            let unresolved = team_idx.iter().filter(|&&i| sides[i].is_none()).count();
            // A repeated side cannot be trusted for either outcome.
            if resolved.len() != team_idx.len() || resolved.windows(2).any(|w| w[0] == w[1]) {
                for &i in &team_idx {
                    sides[i] = None;
                }
            }
            warnings.push(MatchWarning::Unresolved {
                market,
                outcomes: unresolved.max(1),
            });
            (MatchConfidence::Low, MatchMethod::Unresolved)
        };

        let mut result = MarketMatch {
            market,
            sides,
            confidence,
            method,
            warnings,
            overround,
        };
        validate_two_sided(&mut result, outcomes);
        result
    }
}

fn match_totals(outcomes: &[RawOutcome], overround: Option<f64>) -> MarketMatch {
    let mut warnings = Vec::new();
    let sides: Vec<Option<Side>> = outcomes
        .iter()
        .map(|o| {
            let label = normalize_text(&o.name);
            let side = match label.as_str() {
                l if l.starts_with("over") || l == "o" => Some(Side::Over),
                l if l.starts_with("under") || l == "u" => Some(Side::Under),
                _ => None,
            };
            if side.is_none() {
                warnings.push(MatchWarning::UnrecognizedLabel {
                    market: MarketType::Total,
                    label: o.name.clone(),
                });
            }
            side
        })
        .collect();
    let confidence = if warnings.is_empty() {
        MatchConfidence::High
    } else {
        MatchConfidence::Low
    };
    MarketMatch {
        market: MarketType::Total,
        sides,
        confidence,
        method: MatchMethod::Direction,
        warnings,
        overround,
    }
}

/// Post-hoc checks for moneyline/spread markets once sides are resolved.
fn validate_two_sided(result: &mut MarketMatch, outcomes: &[RawOutcome]) {
    let away = side_outcome(result, outcomes, Side::Away);
    let home = side_outcome(result, outcomes, Side::Home);
    let (Some(away), Some(home)) = (away, home) else {
        return;
    };

    if result.confidence == MatchConfidence::Low && away.price > 1.0 && home.price > 1.0 {
        let ratio = away.price.max(home.price) / away.price.min(home.price);
        if ratio > REVERSAL_ODDS_RATIO {
            result.warnings.push(MatchWarning::PotentialReversal {
                market: result.market,
                odds_ratio: ratio,
            });
        }
    }

    if result.market == MarketType::Spread {
        if let (Some(a), Some(h)) = (away.point, home.point) {
            if (a + h).abs() > 0.01 {
                result.warnings.push(MatchWarning::UnmirroredSpread {
                    away_point: a,
                    home_point: h,
                });
            }
        }
    }
}

fn side_outcome<'a>(
    result: &MarketMatch,
    outcomes: &'a [RawOutcome],
    side: Side,
) -> Option<&'a RawOutcome> {
    result
        .sides
        .iter()
        .position(|s| *s == Some(side))
        .and_then(|i| outcomes.get(i))
}

/// Moneyline favourite (shorter price) must be the spread favourite (negative point).
fn favorite_mismatch(odds: &BookmakerOdds, markets: &[MarketMatch]) -> Option<MatchWarning> {
    let outcomes_for = |market: MarketType| {
        odds.markets
            .iter()
            .find(|m| MarketType::from_key(&m.key) == Some(market))
            .map(|m| m.outcomes.as_slice())
    };
    let ml = markets.iter().find(|m| m.market == MarketType::Moneyline)?;
    let sp = markets.iter().find(|m| m.market == MarketType::Spread)?;
    let ml_out = outcomes_for(MarketType::Moneyline)?;
    let sp_out = outcomes_for(MarketType::Spread)?;

    let ml_away = side_outcome(ml, ml_out, Side::Away)?;
    let ml_home = side_outcome(ml, ml_out, Side::Home)?;
    let ratio = ml_away.price.max(ml_home.price) / ml_away.price.min(ml_home.price);
    if ratio < 1.1 {
        return None;
    }
    let moneyline_favorite = if ml_home.price < ml_away.price { Side::Home } else { Side::Away };

    let sp_home = side_outcome(sp, sp_out, Side::Home)?.point?;
    if sp_home.abs() < f64::EPSILON {
        return None;
    }
    let spread_favorite = if sp_home < 0.0 { Side::Home } else { Side::Away };

    (moneyline_favorite != spread_favorite).then_some(MatchWarning::FavoriteMismatch {
        moneyline_favorite,
        spread_favorite,
    })
}

fn overround(outcomes: &[RawOutcome]) -> Option<f64> {
    let valid: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.price.is_finite() && o.price > 1.0)
        .map(|o| 1.0 / o.price)
        .collect();
    (valid.len() >= 2 && valid.len() == outcomes.len()).then(|| valid.iter().sum())
}

pub(crate) fn is_draw_label(label: &str) -> bool {
    matches!(label, "draw" | "tie" | "x")
}

/// Whole-word containment on normalized strings.
fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

pub fn normalize_text(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::RawMarket;

    fn outcome(name: &str, price: f64, point: Option<f64>) -> RawOutcome {
        RawOutcome {
            name: name.into(),
            price,
            point,
        }
    }

    #[test]
    fn exact_names_are_high_confidence() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("Miami Heat", 1.8, None), outcome("Boston Celtics", 2.1, None)],
        );
        assert_eq!(r.sides, vec![Some(Side::Home), Some(Side::Away)]);
        assert_eq!(r.confidence, MatchConfidence::High);
        assert_eq!(r.method, MatchMethod::Exact);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn nickname_matches_through_last_token() {
        let m = TeamMatcher::new("LA Clippers", "Los Angeles Lakers");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("Lakers", 1.7, None), outcome("Clippers", 2.2, None)],
        );
        assert_eq!(r.sides, vec![Some(Side::Home), Some(Side::Away)]);
        assert_eq!(r.confidence, MatchConfidence::Medium);
        assert_eq!(r.method, MatchMethod::NameVariant);
    }

    #[test]
    fn shared_city_prefers_more_specific_variant() {
        let m = TeamMatcher::new("New York Knicks", "New York Rangers");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("NY Rangers", 1.9, None), outcome("New York Knicks", 1.9, None)],
        );
        assert_eq!(r.sides, vec![Some(Side::Home), Some(Side::Away)]);
    }

    #[test]
    fn one_resolved_label_infers_the_other() {
        let m = TeamMatcher::new("Boston Bruins", "Toronto Maple Leafs");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("BOS", 2.0, None), outcome("Toronto", 1.8, None)],
        );
        assert_eq!(r.sides, vec![Some(Side::Away), Some(Side::Home)]);
        assert_eq!(r.method, MatchMethod::Inferred);
        assert_eq!(r.confidence, MatchConfidence::Medium);
        assert!(matches!(r.warnings[0], MatchWarning::InferredSide { .. }));
    }

    #[test]
    fn positional_fallback_is_low_confidence() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("Team A", 2.0, None), outcome("Team B", 1.9, None)],
        );
        assert_eq!(r.sides, vec![Some(Side::Away), Some(Side::Home)]);
        assert_eq!(r.confidence, MatchConfidence::Low);
        assert_eq!(r.method, MatchMethod::Positional);
        assert!(!r.potential_reversal());
    }

    #[test]
    fn lopsided_positional_match_flags_potential_reversal() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("BC", 1.10, None), outcome("MH", 7.50, None)],
        );
        assert_eq!(r.confidence, MatchConfidence::Low);
        assert!(r.potential_reversal());
    }

    #[test]
    fn lopsided_but_confident_match_is_not_flagged() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let r = m.match_market(
            MarketType::Moneyline,
            &[outcome("Boston Celtics", 1.10, None), outcome("Miami Heat", 7.50, None)],
        );
        assert!(!r.potential_reversal());
    }

    #[test]
    fn draw_outcome_is_left_unassigned() {
        let m = TeamMatcher::new("Arsenal", "Chelsea");
        let r = m.match_market(
            MarketType::Moneyline,
            &[
                outcome("Arsenal", 2.6, None),
                outcome("Chelsea", 2.8, None),
                outcome("Draw", 3.3, None),
            ],
        );
        assert_eq!(r.sides, vec![Some(Side::Away), Some(Side::Home), None]);
        assert_eq!(r.confidence, MatchConfidence::High);
    }

    #[test]
    fn totals_resolve_by_direction() {
        let m = TeamMatcher::new("A", "B");
        let r = m.match_market(
            MarketType::Total,
            &[outcome("Over", 1.91, Some(220.5)), outcome("Under", 1.91, Some(220.5))],
        );
        assert_eq!(r.sides, vec![Some(Side::Over), Some(Side::Under)]);
        assert_eq!(r.method, MatchMethod::Direction);
        let overround = r.overround.unwrap();
        assert!(overround > 1.04 && overround < 1.05);
    }

    #[test]
    fn unmirrored_spread_is_warned() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let r = m.match_market(
            MarketType::Spread,
            &[
                outcome("Boston Celtics", 1.91, Some(4.5)),
                outcome("Miami Heat", 1.91, Some(-3.5)),
            ],
        );
        assert!(r
            .warnings
            .iter()
            .any(|w| matches!(w, MatchWarning::UnmirroredSpread { .. })));
    }

    #[test]
    fn bookmaker_level_favorite_mismatch_is_surfaced() {
        let m = TeamMatcher::new("Boston Celtics", "Miami Heat");
        let odds = BookmakerOdds {
            bookmaker: "book".into(),
            markets: vec![
                RawMarket {
                    key: "h2h".into(),
                    outcomes: vec![
                        outcome("Boston Celtics", 1.40, None),
                        outcome("Miami Heat", 3.10, None),
                    ],
                },
                RawMarket {
                    key: "spreads".into(),
                    outcomes: vec![
                        outcome("Boston Celtics", 1.91, Some(7.5)),
                        outcome("Miami Heat", 1.91, Some(-7.5)),
                    ],
                },
                RawMarket {
                    key: "player_points".into(),
                    outcomes: vec![],
                },
            ],
        };
        let r = m.match_bookmaker(&odds);
        assert_eq!(r.markets.len(), 2);
        assert_eq!(r.confidence, MatchConfidence::High);
        assert!(r.warnings.iter().any(|w| w.contains("moneyline favours away")));
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize_text("St. Louis  Blues!"), "st louis blues");
    }
}
