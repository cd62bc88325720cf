use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::types::{Article, MarketQuote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Yes => "YES",
            Direction::No => "NO",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_uppercase().as_str() {
            "YES" => Some(Direction::Yes),
            "NO" => Some(Direction::No),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully validated trading signal. Created and consumed within one tick;
/// `edge` is the fee/slippage-adjusted expected value recomputed by the
/// edge evaluator, never the extractor's own number.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub direction: Direction,
    pub quoted_price: f64,
    pub effective_price: f64,
    pub estimated_prob: f64,
    pub edge: f64,
    pub confidence: u8,
    pub reasoning: String,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Turn this tick's articles and market snapshot into signals. `bankroll`
    /// bounds the stake contemplated when pricing slippage; `now` is the tick
    /// clock (wall time live, replay time in backtests).
    async fn generate_signals(
        &self,
        articles: &[Article],
        markets: &[MarketQuote],
        bankroll: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>>;
}
