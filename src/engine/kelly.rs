//! Suggested stake for a recommendation: fractional Kelly on the best price.
//!
//! `f* = (b·p − q) / b` with `b` the net decimal odds (price − 1), `p` the
//! model probability and `q = 1 − p`. The result is scaled by the configured
//! Kelly fraction.

/// Calculate the fractional Kelly stake for a bet at a decimal price.
///
/// # Arguments
/// * `win_prob` – Model probability that the bet wins; clamped to 0.0–1.0.
/// * `decimal_price` – Best decimal price on offer, stake included (e.g. 2.10).
/// * `kelly_fraction` – Fractional Kelly multiplier; clamped to 0.0–1.0.
///
/// # Returns
/// The fraction of bankroll to stake (0.0–1.0). Returns `0.0` without a
/// positive edge, or when the price is 1.0 or lower and pays nothing.
pub fn kelly_stake(win_prob: f64, decimal_price: f64, kelly_fraction: f64) -> f64 {
    if !(decimal_price > 1.0) {
        return 0.0;
    }

    let b = decimal_price - 1.0;
    let p = win_prob.clamp(0.0, 1.0);
    let q = 1.0 - p;

    let f = (b * p - q) / b;

    if f <= 0.0 {
        return 0.0;
    }

    (f * kelly_fraction.clamp(0.0, 1.0)).clamp(0.0, 1.0)
}
