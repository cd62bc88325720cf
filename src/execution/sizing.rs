//! Fractional-Kelly position sizing. Everything here is a pure function:
//! identical inputs must yield identical stakes, or backtests stop being
//! reproducible.

/// Kelly criterion bankroll fraction, scaled by the configured fraction
/// (0.5 = half-Kelly).
///
/// `net_odds` is b in `f* = (p*b - q) / b`: the net payout per dollar
/// staked, `1/price - 1` for a binary share.
pub fn kelly_fraction(prob_win: f64, net_odds: f64, fraction: f64) -> f64 {
    if net_odds <= 0.0 || prob_win <= 0.0 || prob_win >= 1.0 || fraction <= 0.0 {
        return 0.0;
    }

    let q = 1.0 - prob_win;
    let kelly = (prob_win * net_odds - q) / net_odds;
    if kelly <= 0.0 {
        return 0.0;
    }

    (kelly * fraction).clamp(0.0, 1.0)
}

/// USD stake for a signal: fractional Kelly on the fee-adjusted price,
/// capped at `max_bet_pct` of bankroll, floored to zero when the raw Kelly
/// fraction is non-positive.
pub fn calculate_stake(
    bankroll: f64,
    estimated_prob: f64,
    effective_price: f64,
    kelly_frac: f64,
    max_bet_pct: f64,
) -> f64 {
    if bankroll <= 0.0 || max_bet_pct <= 0.0 || kelly_frac <= 0.0 {
        return 0.0;
    }
    if effective_price <= 0.0 || effective_price >= 1.0 {
        return 0.0;
    }

    let net_odds = 1.0 / effective_price - 1.0;
    let fraction = kelly_fraction(estimated_prob, net_odds, kelly_frac);
    if fraction <= 0.0 {
        return 0.0;
    }

    bankroll * fraction.min(max_bet_pct)
}
