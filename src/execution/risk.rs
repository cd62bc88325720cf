use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::RiskConfig;
use crate::execution::types::{Position, RiskState};
use crate::strategies::types::Signal;

/// Why a signal+stake pair was turned away. Expected control flow, recorded
/// with its reason, not an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskRejection {
    #[error("edge {edge:.3} below min_edge {min_edge:.3}")]
    MinEdge { edge: f64, min_edge: f64 },

    #[error("max concurrent positions reached ({open})")]
    MaxPositions { open: usize },

    #[error("daily pnl {daily_pnl:.2} breaches loss limit {limit:.2}")]
    DailyLossLimit { daily_pnl: f64, limit: f64 },

    #[error("market volume unavailable")]
    VolumeUnavailable,

    #[error("stake {stake:.2} exceeds volume cap {cap:.2}")]
    VolumeCap { stake: f64, cap: f64 },

    #[error("market exposure {exposure:.2} would exceed cap {cap:.2}")]
    ExposureCap { exposure: f64, cap: f64 },
}

/// Portfolio-level gatekeeper. Every check is a total function over the
/// arguments it is handed; no hidden I/O, so the gate behaves identically
/// in backtest, paper and live.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    max_bet_pct: f64,
}

impl RiskManager {
    pub fn new(config: RiskConfig, max_bet_pct: f64) -> Self {
        Self { config, max_bet_pct }
    }

    /// Ordered gate, short-circuiting on the first failure.
    pub fn validate(
        &self,
        signal: &Signal,
        stake: f64,
        state: &RiskState,
        market_volume_24h: f64,
        existing_position: Option<&Position>,
    ) -> Result<(), RiskRejection> {
        // 1. Edge floor, re-checked even though the evaluator already did.
        if signal.edge < self.config.min_edge {
            return Err(RiskRejection::MinEdge {
                edge: signal.edge,
                min_edge: self.config.min_edge,
            });
        }

        // 2. Concurrent position cap.
        if state.open_position_count >= self.config.max_concurrent_positions {
            return Err(RiskRejection::MaxPositions {
                open: state.open_position_count,
            });
        }

        // 3. Daily loss limit against the start-of-day bankroll.
        let loss_limit = -self.config.max_daily_loss_pct * state.start_of_day_bankroll;
        if state.daily_pnl < loss_limit {
            return Err(RiskRejection::DailyLossLimit {
                daily_pnl: state.daily_pnl,
                limit: loss_limit,
            });
        }

        // 4. Stake vs 24h market volume.
        if market_volume_24h <= 0.0 {
            return Err(RiskRejection::VolumeUnavailable);
        }
        let volume_cap = self.config.max_volume_pct * market_volume_24h;
        if stake > volume_cap {
            return Err(RiskRejection::VolumeCap {
                stake,
                cap: volume_cap,
            });
        }

        // 5. Combined exposure in this market.
        let existing_cost = existing_position.map(|p| p.cost).unwrap_or(0.0);
        let exposure = existing_cost + stake;
        let exposure_cap = self.max_bet_pct * state.bankroll;
        if exposure > exposure_cap {
            return Err(RiskRejection::ExposureCap {
                exposure,
                cap: exposure_cap,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HaltReason {
    Drawdown(f64),
    DailyLoss(f64),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::Drawdown(dd) => write!(f, "drawdown {:.1}%", dd * 100.0),
            HaltReason::DailyLoss(pnl) => write!(f, "daily loss ${:.2}", -pnl),
        }
    }
}

/// Kill-criteria policy: when tripped, the loop suspends new bets but keeps
/// tracking existing positions. Evaluated from accountant/risk outputs each
/// tick; the loop only executes what this says.
#[derive(Debug, Default)]
pub struct TradingHalt {
    reason: Option<HaltReason>,
    since: Option<DateTime<Utc>>,
}

impl TradingHalt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.reason.is_some()
    }

    pub fn reason(&self) -> Option<HaltReason> {
        self.reason
    }

    pub fn evaluate(
        &mut self,
        max_drawdown: f64,
        state: &RiskState,
        config: &RiskConfig,
        now: DateTime<Utc>,
    ) {
        if self.reason.is_some() {
            return;
        }

        if config.halt_drawdown_pct > 0.0 && max_drawdown > config.halt_drawdown_pct {
            self.trip(HaltReason::Drawdown(max_drawdown), now);
            return;
        }

        let loss_limit = -config.max_daily_loss_pct * state.start_of_day_bankroll;
        if state.daily_pnl < loss_limit {
            self.trip(HaltReason::DailyLoss(state.daily_pnl), now);
        }
    }

    pub fn trip(&mut self, reason: HaltReason, now: DateTime<Utc>) {
        error!("TRADING HALTED: {}", reason);
        self.reason = Some(reason);
        self.since = Some(now);
    }

    /// Manual reset; halts never clear themselves. A new day's loss budget
    /// for instance only applies after an operator decision.
    pub fn clear(&mut self) {
        if let Some(reason) = self.reason.take() {
            info!("trading halt cleared (was: {})", reason);
        }
        self.since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::types::Direction;

    fn config() -> RiskConfig {
        RiskConfig {
            min_edge: 0.05,
            max_concurrent_positions: 10,
            max_daily_loss_pct: 0.10,
            max_volume_pct: 0.10,
            halt_drawdown_pct: 0.25,
        }
    }

    fn signal(edge: f64) -> Signal {
        Signal {
            timestamp: Utc::now(),
            market_id: "m1".to_string(),
            direction: Direction::Yes,
            quoted_price: 0.5,
            effective_price: 0.5,
            estimated_prob: 0.6,
            edge,
            confidence: 7,
            reasoning: "test".to_string(),
        }
    }

    fn state() -> RiskState {
        RiskState {
            bankroll: 500.0,
            start_of_day_bankroll: 500.0,
            daily_pnl: 0.0,
            open_position_count: 0,
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(config(), 0.05)
    }

    #[test]
    fn test_accepts_within_all_limits() {
        let result = manager().validate(&signal(0.10), 20.0, &state(), 10_000.0, None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_thin_edge_first() {
        // Even with every other limit blown, the edge gate fires first.
        let mut s = state();
        s.open_position_count = 99;
        let result = manager().validate(&signal(0.03), 20.0, &s, 0.0, None);
        assert_eq!(
            result,
            Err(RiskRejection::MinEdge {
                edge: 0.03,
                min_edge: 0.05
            })
        );
    }

    #[test]
    fn test_rejects_at_position_cap() {
        let mut s = state();
        s.open_position_count = 10;
        let result = manager().validate(&signal(0.10), 20.0, &s, 10_000.0, None);
        assert_eq!(result, Err(RiskRejection::MaxPositions { open: 10 }));
    }

    #[test]
    fn test_rejects_past_daily_loss_limit() {
        let mut s = state();
        s.daily_pnl = -60.0; // limit is -50 on a 500 start-of-day bankroll
        let result = manager().validate(&signal(0.10), 20.0, &s, 10_000.0, None);
        assert!(matches!(result, Err(RiskRejection::DailyLossLimit { .. })));
    }

    #[test]
    fn test_rejects_when_volume_unavailable() {
        let result = manager().validate(&signal(0.10), 20.0, &state(), 0.0, None);
        assert_eq!(result, Err(RiskRejection::VolumeUnavailable));
    }

    #[test]
    fn test_rejects_oversized_stake_vs_volume() {
        let result = manager().validate(&signal(0.10), 20.0, &state(), 100.0, None);
        assert!(matches!(result, Err(RiskRejection::VolumeCap { .. })));
    }

    #[test]
    fn test_rejects_combined_exposure() {
        let existing = Position {
            market_id: "m1".to_string(),
            direction: Direction::Yes,
            shares: 30.0,
            avg_price: 0.5,
            cost: 15.0,
            opened_at: Utc::now(),
        };
        // 15 existing + 20 new > 5% of 500.
        let result = manager().validate(&signal(0.10), 20.0, &state(), 10_000.0, Some(&existing));
        assert!(matches!(result, Err(RiskRejection::ExposureCap { .. })));
    }

    #[test]
    fn test_halt_trips_on_drawdown() {
        let mut halt = TradingHalt::new();
        halt.evaluate(0.30, &state(), &config(), Utc::now());
        assert!(halt.is_active());
        assert!(matches!(halt.reason(), Some(HaltReason::Drawdown(_))));

        halt.clear();
        assert!(!halt.is_active());
    }

    #[test]
    fn test_halt_stays_quiet_within_limits() {
        let mut halt = TradingHalt::new();
        halt.evaluate(0.10, &state(), &config(), Utc::now());
        assert!(!halt.is_active());
    }
}
