use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::strategies::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    #[serde(rename = "backtest")]
    Backtest,
    #[serde(rename = "paper")]
    Paper,
    #[serde(rename = "live")]
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Backtest => "backtest",
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Option<TradingMode> {
        match s.trim().to_lowercase().as_str() {
            "backtest" => Some(TradingMode::Backtest),
            "paper" => Some(TradingMode::Paper),
            "live" => Some(TradingMode::Live),
            _ => None,
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once created. The stake respects `max_bet_pct x bankroll` at
/// placement time; the risk gate enforces it before execution.
#[derive(Debug, Clone, Serialize)]
pub struct Bet {
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub direction: Direction,
    pub stake_amount: f64,
    pub execution_price: f64,
    pub estimated_prob: f64,
    pub edge_at_entry: f64,
    pub kelly_fraction_applied: f64,
    pub mode: TradingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub market_id: String,
    pub direction: Direction,
    pub shares: f64,
    pub avg_price: f64,
    pub cost: f64,
    pub opened_at: DateTime<Utc>,
}

/// Read-only snapshot for the risk gates. Only the execution simulator
/// mutates the underlying numbers, and only inside a tick's Acting/Tracking
/// phases.
#[derive(Debug, Clone, Copy)]
pub struct RiskState {
    pub bankroll: f64,
    pub start_of_day_bankroll: f64,
    pub daily_pnl: f64,
    pub open_position_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub date: NaiveDate,
    pub bankroll: f64,
}

/// A bet the ledger has seen settle, as read back for performance math.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBet {
    pub market_id: String,
    pub direction: Direction,
    pub stake_amount: f64,
    pub pnl: f64,
    pub edge_at_entry: f64,
    pub won: bool,
    pub resolved_at: DateTime<Utc>,
}
