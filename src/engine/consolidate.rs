//! Merge per-bookmaker candidates into one ranked recommendation list.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::types::{MarketType, Recommendation, Side};

/// Group candidates by (market, side); price and book are not part of the key.
///
/// Each group is represented by its best-priced candidate, whose price, edge
/// and confidence are kept as-is so the displayed odds and the numbers derived
/// from them always belong to the same book.
pub fn consolidate(candidates: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut groups: BTreeMap<(MarketType, Side), Vec<Recommendation>> = BTreeMap::new();
    for c in candidates {
        groups.entry((c.market, c.side)).or_default().push(c);
    }

    let mut merged: Vec<Recommendation> = groups
        .into_values()
        .filter_map(|group| {
            let mut books: Vec<String> = Vec::new();
            for c in &group {
                for b in &c.bookmakers {
                    if !books.contains(b) {
                        books.push(b.clone());
                    }
                }
            }
            let mut best = group.into_iter().reduce(|best, c| {
                match c.decimal_price.partial_cmp(&best.decimal_price) {
                    Some(Ordering::Greater) => c,
                    Some(Ordering::Equal) if c.confidence > best.confidence => c,
                    _ => best,
                }
            })?;
            best.bookmaker = if books.len() == 1 {
                books[0].clone()
            } else {
                format!("{} books", books.len())
            };
            best.bookmakers = books;
            Some(best)
        })
        .collect();

    rank(&mut merged);
    merged
}

/// Final admission: spread and total bets need `min_confidence`; moneyline
/// bets were already admitted on edge alone.
pub fn admit(recs: Vec<Recommendation>, min_confidence: u32) -> Vec<Recommendation> {
    recs.into_iter()
        .filter(|r| r.market == MarketType::Moneyline || r.confidence >= min_confidence)
        .collect()
}

/// Highest confidence first, then largest edge.
pub fn rank(recs: &mut [Recommendation]) {
    recs.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then_with(|| b.edge.partial_cmp(&a.edge).unwrap_or(Ordering::Equal))
    });
}
