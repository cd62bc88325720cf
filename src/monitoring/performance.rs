use anyhow::Result;
use serde::Serialize;

use crate::execution::persistence::TradeStore;

/// Annualization for daily returns.
const TRADING_DAYS_PER_YEAR: f64 = 365.0;

/// Period-over-period returns of an equity series.
pub fn daily_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Annualized Sharpe ratio over daily returns. 0 (never NaN) for fewer than
/// two samples or a flat series.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }

    (mean / std_dev) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline as a fraction of the peak. 0 for series
/// shorter than two samples.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }

    let mut peak = equity[0];
    let mut max_dd: f64 = 0.0;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak <= 0.0 {
            continue;
        }
        max_dd = max_dd.max((peak - value) / peak);
    }
    max_dd
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub num_bets: usize,
    pub wins: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
    pub avg_edge: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// Pure aggregation over the append-only ledger; recomputed on demand,
/// never cached or mutated in place.
pub struct PerformanceAccountant;

impl PerformanceAccountant {
    pub fn report(store: &TradeStore) -> Result<PerformanceReport> {
        let resolved = store.resolved_bets()?;

        let num_bets = resolved.len();
        let wins = resolved.iter().filter(|b| b.pnl > 0.0).count();
        let total_pnl: f64 = resolved.iter().map(|b| b.pnl).sum();
        let win_rate = if num_bets > 0 {
            wins as f64 / num_bets as f64
        } else {
            0.0
        };
        let avg_edge = if num_bets > 0 {
            resolved.iter().map(|b| b.edge_at_entry).sum::<f64>() / num_bets as f64
        } else {
            0.0
        };

        let equity: Vec<f64> = store.equity_series()?.iter().map(|s| s.bankroll).collect();

        Ok(PerformanceReport {
            num_bets,
            wins,
            total_pnl,
            win_rate,
            avg_edge,
            sharpe_ratio: sharpe_ratio(&daily_returns(&equity)),
            max_drawdown: max_drawdown(&equity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::Resolution;
    use crate::execution::types::{Bet, EquitySample, TradingMode};
    use crate::strategies::types::Direction;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_max_drawdown_example() {
        let dd = max_drawdown(&[500.0, 600.0, 450.0, 700.0]);
        assert!((dd - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_short_series_never_nan() {
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[500.0]), 0.0);
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[0.01]), 0.0);
    }

    #[test]
    fn test_zero_variance_sharpe_is_zero() {
        assert_eq!(sharpe_ratio(&[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(sharpe_ratio(&daily_returns(&[100.0, 100.0, 100.0])), 0.0);
    }

    #[test]
    fn test_positive_drift_positive_sharpe() {
        let returns = daily_returns(&[100.0, 102.0, 103.0, 106.0]);
        assert!(sharpe_ratio(&returns) > 0.0);
    }

    #[test]
    fn test_monotonic_series_has_no_drawdown() {
        assert_eq!(max_drawdown(&[100.0, 110.0, 125.0]), 0.0);
    }

    #[test]
    fn test_report_from_ledger() {
        let mut store = TradeStore::open(":memory:", 100.0).unwrap();

        let mut place = |market: &str, direction: Direction, stake: f64, edge: f64| {
            store
                .execute_bet(&Bet {
                    timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
                    market_id: market.to_string(),
                    direction,
                    stake_amount: stake,
                    execution_price: 0.5,
                    estimated_prob: 0.6,
                    edge_at_entry: edge,
                    kelly_fraction_applied: 0.5,
                    mode: TradingMode::Paper,
                })
                .unwrap();
        };
        place("m1", Direction::Yes, 10.0, 0.10);
        place("m2", Direction::Yes, 5.0, 0.05);
        place("m3", Direction::Yes, 5.0, 0.21);

        let resolve = |store: &mut TradeStore, market: &str, outcome: Direction| {
            store
                .settle_market(&Resolution {
                    market_id: market.to_string(),
                    outcome,
                    resolved_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
                })
                .unwrap();
        };
        resolve(&mut store, "m1", Direction::Yes); // +10
        resolve(&mut store, "m2", Direction::No); // -5
        resolve(&mut store, "m3", Direction::Yes); // +5

        for (i, bankroll) in [100.0, 95.0, 110.0].iter().enumerate() {
            store
                .record_equity_sample(&EquitySample {
                    date: NaiveDate::from_ymd_opt(2026, 3, 1 + i as u32).unwrap(),
                    bankroll: *bankroll,
                })
                .unwrap();
        }

        let report = PerformanceAccountant::report(&store).unwrap();
        assert_eq!(report.num_bets, 3);
        assert_eq!(report.wins, 2);
        assert!((report.total_pnl - 10.0).abs() < 1e-9);
        assert!((report.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.avg_edge - 0.12).abs() < 1e-9);
        assert!((report.max_drawdown - 0.05).abs() < 1e-9);
    }
}
