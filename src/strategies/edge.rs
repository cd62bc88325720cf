use chrono::{DateTime, Utc};
use tracing::debug;

use crate::data::types::{MarketQuote, RawSignal};
use crate::strategies::types::Signal;

/// Effective prices are clamped below $1; a binary share can never cost more
/// than its payout.
const MAX_EFFECTIVE_PRICE: f64 = 0.999;

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("estimated probability {0} outside [0, 1]")]
    InvalidSignal(f64),

    #[error("missing or stale quote for market {0}")]
    StaleMarketData(String),
}

/// Taker fee plus linear price impact against the resting book.
#[derive(Debug, Clone)]
pub struct FeeModel {
    pub taker_fee_rate: f64,
    pub slippage_coeff: f64,
}

impl FeeModel {
    pub fn effective_price(&self, quoted_price: f64, stake: f64, book_depth: f64) -> f64 {
        let impact = if book_depth > 0.0 {
            self.slippage_coeff * (stake / book_depth)
        } else {
            // No depth information: assume the full impact coefficient.
            self.slippage_coeff
        };
        (quoted_price * (1.0 + impact)).min(MAX_EFFECTIVE_PRICE)
    }
}

/// Converts an untrusted raw signal plus a market quote into a validated
/// Signal, or rejects it. Pure: identical inputs always produce identical
/// output, in every execution mode.
#[derive(Debug, Clone)]
pub struct EdgeEvaluator {
    fee_model: FeeModel,
    min_edge: f64,
    min_confidence: u8,
}

impl EdgeEvaluator {
    pub fn new(fee_model: FeeModel, min_edge: f64, min_confidence: u8) -> Self {
        Self {
            fee_model,
            min_edge,
            min_confidence,
        }
    }

    /// `contemplated_stake` is the portfolio cap for a single bet
    /// (max_bet_pct x bankroll); slippage is priced against it so evaluation
    /// does not depend on the sizing step that runs later.
    pub fn evaluate(
        &self,
        raw: &RawSignal,
        quote: &MarketQuote,
        contemplated_stake: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, SignalError> {
        if !(0.0..=1.0).contains(&raw.estimated_prob) {
            return Err(SignalError::InvalidSignal(raw.estimated_prob));
        }

        let quoted_price = quote.ask_for(raw.direction);
        if quote.resolved || quoted_price <= 0.0 || quoted_price >= 1.0 {
            return Err(SignalError::StaleMarketData(quote.market_id.clone()));
        }

        if raw.confidence < self.min_confidence {
            debug!(
                "signal for {} rejected: confidence {} below {}",
                raw.market_id, raw.confidence, self.min_confidence
            );
            return Ok(None);
        }

        let effective_price =
            self.fee_model
                .effective_price(quoted_price, contemplated_stake, quote.book_depth);

        let p = raw.estimated_prob;
        let edge = p * (1.0 - effective_price)
            - (1.0 - p) * effective_price
            - self.fee_model.taker_fee_rate;

        if edge <= self.min_edge {
            debug!(
                "signal for {} rejected: edge {:.4} at or below min_edge {:.4}",
                raw.market_id, edge, self.min_edge
            );
            return Ok(None);
        }

        Ok(Some(Signal {
            timestamp: now,
            market_id: raw.market_id.clone(),
            direction: raw.direction,
            quoted_price,
            effective_price,
            estimated_prob: p,
            edge,
            confidence: raw.confidence,
            reasoning: raw.reasoning.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::types::Direction;

    fn quote(yes_ask: f64) -> MarketQuote {
        MarketQuote {
            market_id: "m1".to_string(),
            question: "Will X happen?".to_string(),
            yes_price: yes_ask,
            no_price: 1.0 - yes_ask,
            yes_ask,
            no_ask: 1.0 - yes_ask,
            volume_24h: 50_000.0,
            book_depth: 10_000.0,
            end_date: None,
            resolved: false,
            outcome: None,
        }
    }

    fn raw(prob: f64, confidence: u8) -> RawSignal {
        RawSignal {
            market_id: "m1".to_string(),
            direction: Direction::Yes,
            estimated_prob: prob,
            confidence,
            reasoning: "test".to_string(),
        }
    }

    fn evaluator(fee: f64) -> EdgeEvaluator {
        EdgeEvaluator::new(
            FeeModel {
                taker_fee_rate: fee,
                slippage_coeff: 0.0,
            },
            0.05,
            6,
        )
    }

    #[test]
    fn test_edge_without_fees() {
        let signal = evaluator(0.0)
            .evaluate(&raw(0.75, 8), &quote(0.60), 25.0, Utc::now())
            .unwrap()
            .unwrap();
        assert!((signal.edge - 0.15).abs() < 1e-9);
        assert_eq!(signal.quoted_price, 0.60);
    }

    #[test]
    fn test_edge_with_taker_fee() {
        let signal = evaluator(0.02)
            .evaluate(&raw(0.75, 8), &quote(0.60), 25.0, Utc::now())
            .unwrap()
            .unwrap();
        assert!((signal.edge - 0.13).abs() < 1e-9);
    }

    #[test]
    fn test_slippage_raises_effective_price() {
        let evaluator = EdgeEvaluator::new(
            FeeModel {
                taker_fee_rate: 0.0,
                slippage_coeff: 1.0,
            },
            0.0,
            1,
        );
        // stake 1000 into depth 10000 -> 10% impact on the quoted price.
        let signal = evaluator
            .evaluate(&raw(0.75, 8), &quote(0.60), 1000.0, Utc::now())
            .unwrap()
            .unwrap();
        assert!((signal.effective_price - 0.66).abs() < 1e-9);
        assert!(signal.edge < 0.15);
    }

    #[test]
    fn test_rejects_below_min_edge() {
        // p=0.62 at 0.60: edge 0.02, below the 0.05 floor.
        let result = evaluator(0.0).evaluate(&raw(0.62, 8), &quote(0.60), 25.0, Utc::now());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_rejects_low_confidence() {
        let result = evaluator(0.0).evaluate(&raw(0.75, 3), &quote(0.60), 25.0, Utc::now());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_invalid_probability_is_an_error() {
        let result = evaluator(0.0).evaluate(&raw(1.2, 8), &quote(0.60), 25.0, Utc::now());
        assert!(matches!(result, Err(SignalError::InvalidSignal(_))));
    }

    #[test]
    fn test_resolved_market_is_stale() {
        let mut q = quote(0.60);
        q.resolved = true;
        let result = evaluator(0.0).evaluate(&raw(0.75, 8), &q, 25.0, Utc::now());
        assert!(matches!(result, Err(SignalError::StaleMarketData(_))));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let now = Utc::now();
        let a = evaluator(0.02)
            .evaluate(&raw(0.75, 8), &quote(0.60), 25.0, now)
            .unwrap()
            .unwrap();
        let b = evaluator(0.02)
            .evaluate(&raw(0.75, 8), &quote(0.60), 25.0, now)
            .unwrap()
            .unwrap();
        assert_eq!(a.edge, b.edge);
        assert_eq!(a.effective_price, b.effective_price);
    }
}
