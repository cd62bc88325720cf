use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::data::types::Resolution;
use crate::execution::persistence::TradeStore;
use crate::execution::types::{Bet, EquitySample, Position, RiskState, TradingMode};

/// Where a market sits in the `NoPosition -> Open -> Resolved` machine.
/// Resolved is terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketState {
    NoPosition,
    Open(Position),
    Resolved,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("insufficient bankroll: stake {stake:.2} exceeds available {available:.2}")]
    InsufficientBankroll { stake: f64, available: f64 },

    #[error("market {0} already holds a position on the opposite side")]
    DirectionConflict(String),

    #[error("market {0} is already resolved")]
    MarketResolved(String),

    #[error("invalid execution price {0}")]
    InvalidPrice(f64),

    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}

/// Sole owner of bankroll and position state. Paper and backtest share this
/// engine; live execution is an external collaborator with the same
/// contract. All mutation happens inside a tick's Acting/Tracking phases.
pub struct ExecutionSimulator {
    store: TradeStore,
    mode: TradingMode,
}

impl ExecutionSimulator {
    pub fn new(store: TradeStore, mode: TradingMode) -> Result<Self> {
        let simulator = Self { store, mode };
        // Recovery pass: whatever the ledger says survived the last run.
        let open = simulator.store.open_position_count()?;
        info!(
            "execution simulator ready (mode={}, bankroll=${:.2}, open positions={})",
            simulator.mode,
            simulator.store.bankroll()?,
            open
        );
        Ok(simulator)
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn bankroll(&self) -> Result<f64> {
        self.store.bankroll()
    }

    pub fn open_positions(&self) -> Result<Vec<Position>> {
        self.store.open_positions()
    }

    pub fn market_state(&self, market_id: &str) -> Result<MarketState> {
        if self.store.is_resolved(market_id)? {
            return Ok(MarketState::Resolved);
        }
        Ok(match self.store.get_position(market_id)? {
            Some(position) => MarketState::Open(position),
            None => MarketState::NoPosition,
        })
    }

    /// Apply an accepted stake: debit bankroll and create-or-merge the
    /// position, atomically or not at all.
    pub fn place_bet(&mut self, bet: &Bet) -> Result<Position, ExecutionError> {
        if bet.execution_price <= 0.0 || bet.execution_price >= 1.0 {
            return Err(ExecutionError::InvalidPrice(bet.execution_price));
        }

        let available = self.store.bankroll()?;
        if bet.stake_amount > available {
            return Err(ExecutionError::InsufficientBankroll {
                stake: bet.stake_amount,
                available,
            });
        }

        match self.market_state(&bet.market_id)? {
            MarketState::Resolved => {
                return Err(ExecutionError::MarketResolved(bet.market_id.clone()));
            }
            MarketState::Open(existing) if existing.direction != bet.direction => {
                return Err(ExecutionError::DirectionConflict(bet.market_id.clone()));
            }
            _ => {}
        }

        let position = self.store.execute_bet(bet)?;
        info!(
            "bet placed: {} {} ${:.2} @ {:.3} ({:.2} shares, bankroll ${:.2})",
            bet.market_id,
            bet.direction,
            bet.stake_amount,
            bet.execution_price,
            position.shares,
            self.store.bankroll()?
        );
        Ok(position)
    }

    /// Close a position on its market's outcome. Idempotent: a redelivered
    /// resolution, or one for a market we never entered, is a no-op
    /// returning None.
    pub fn resolve(&mut self, resolution: &Resolution) -> Result<Option<f64>> {
        if self.store.is_resolved(&resolution.market_id)? {
            debug!(
                "resolution for {} redelivered, ignoring",
                resolution.market_id
            );
            return Ok(None);
        }
        if self.store.get_position(&resolution.market_id)?.is_none() {
            debug!(
                "resolution for {} without a position, ignoring",
                resolution.market_id
            );
            return Ok(None);
        }

        let pnl = self.store.settle_market(resolution)?;
        info!(
            "position resolved: {} -> {} (P&L {:+.2}, bankroll ${:.2})",
            resolution.market_id,
            resolution.outcome,
            pnl,
            self.store.bankroll()?
        );
        Ok(Some(pnl))
    }

    /// Risk gate snapshot for `day` (the tick clock's date).
    pub fn risk_state(&self, day: NaiveDate) -> Result<RiskState> {
        let bankroll = self.store.bankroll()?;
        let start_of_day_bankroll = self.store.equity_before(day)?.unwrap_or(bankroll);
        Ok(RiskState {
            bankroll,
            start_of_day_bankroll,
            daily_pnl: self.store.daily_pnl(day)?,
            open_position_count: self.store.open_position_count()?,
        })
    }

    /// Append (or refresh) the day's equity sample.
    pub fn sample_equity(&self, day: NaiveDate) -> Result<EquitySample> {
        let sample = EquitySample {
            date: day,
            bankroll: self.store.bankroll()?,
        };
        self.store.record_equity_sample(&sample)?;
        Ok(sample)
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }
}
