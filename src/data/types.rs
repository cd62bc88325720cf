use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategies::types::Direction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    pub market_id: String,
    pub question: String,
    pub yes_price: f64,
    pub no_price: f64,
    pub yes_ask: f64,
    pub no_ask: f64,
    pub volume_24h: f64,
    /// Resting liquidity behind the best ask, in USD. Drives price impact.
    pub book_depth: f64,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub outcome: Option<Direction>,
}

impl MarketQuote {
    /// Best ask for the side a signal wants to buy.
    pub fn ask_for(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Yes => self.yes_ask,
            Direction::No => self.no_ask,
        }
    }
}

/// Untrusted extractor output. Everything here is re-validated and re-priced
/// by the edge evaluator before it can become a Signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub market_id: String,
    pub direction: Direction,
    pub estimated_prob: f64,
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub market_id: String,
    pub outcome: Direction,
    pub resolved_at: DateTime<Utc>,
}

/// A settled market surfaces as a quote with `resolved` and a final outcome.
pub fn detect_resolution(quote: &MarketQuote, seen_at: DateTime<Utc>) -> Option<Resolution> {
    if !quote.resolved {
        return None;
    }
    let outcome = quote.outcome?;
    Some(Resolution {
        market_id: quote.market_id.clone(),
        outcome,
        resolved_at: quote.end_date.unwrap_or(seen_at),
    })
}
