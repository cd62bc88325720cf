use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::data::types::{Article, MarketQuote, Resolution};
use crate::execution::risk::{RiskManager, TradingHalt};
use crate::execution::simulator::{ExecutionSimulator, MarketState};
use crate::execution::sizing::calculate_stake;
use crate::execution::types::{Bet, TradingMode};
use crate::monitoring::logger::CsvLogger;
use crate::strategies::types::{Signal, Strategy};

/// The think/act pipeline. Live paper trading and backtest replay both call
/// into this with their own data and clock; nothing in here branches on
/// mode, which is what makes backtest results transfer.
pub struct DecisionPipeline {
    risk: RiskManager,
    kelly_fraction: f64,
    max_bet_pct: f64,
    mode: TradingMode,
}

#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub signals: usize,
    pub bets_placed: usize,
    pub rejections: usize,
    pub total_staked: f64,
}

impl DecisionPipeline {
    pub fn new(risk: RiskManager, kelly_fraction: f64, max_bet_pct: f64, mode: TradingMode) -> Self {
        Self {
            risk,
            kelly_fraction,
            max_bet_pct,
            mode,
        }
    }

    /// Thinking: run every strategy over the tick's inputs.
    pub async fn think(
        &self,
        strategies: &[Box<dyn Strategy>],
        articles: &[Article],
        markets: &[MarketQuote],
        bankroll: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for strategy in strategies {
            let mut generated = strategy
                .generate_signals(articles, markets, bankroll, now)
                .await?;
            debug!("{} produced {} signal(s)", strategy.name(), generated.len());
            signals.append(&mut generated);
        }
        Ok(signals)
    }

    /// Acting: size, gate and execute each signal in order. Signals rejected
    /// by a gate are recorded with the reason; a halt suspends new bets
    /// entirely while the rest of the tick carries on.
    pub fn act(
        &self,
        signals: Vec<Signal>,
        markets: &[MarketQuote],
        simulator: &mut ExecutionSimulator,
        csv: Option<&CsvLogger>,
        halt: &TradingHalt,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome {
            signals: signals.len(),
            ..CycleOutcome::default()
        };

        if halt.is_active() && !signals.is_empty() {
            warn!(
                "trading halted ({}), dropping {} signal(s)",
                halt.reason().map(|r| r.to_string()).unwrap_or_default(),
                signals.len()
            );
            for signal in &signals {
                simulator.store().log_signal(signal, Some("trading halted"))?;
            }
            outcome.rejections = signals.len();
            return Ok(outcome);
        }

        for signal in signals {
            match self.handle_signal(&signal, markets, simulator, csv, now)? {
                Some(stake) => {
                    outcome.bets_placed += 1;
                    outcome.total_staked += stake;
                }
                None => outcome.rejections += 1,
            }
        }

        Ok(outcome)
    }

    /// One signal through size -> risk gate -> execution. Returns the stake
    /// committed, or None when the signal was turned away.
    fn handle_signal(
        &self,
        signal: &Signal,
        markets: &[MarketQuote],
        simulator: &mut ExecutionSimulator,
        csv: Option<&CsvLogger>,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let reject = |simulator: &ExecutionSimulator, reason: &str| -> Result<Option<f64>> {
            debug!("signal for {} rejected: {}", signal.market_id, reason);
            simulator.store().log_signal(signal, Some(reason))?;
            if let Some(csv) = csv {
                csv.log_signal(signal, Some(reason))?;
            }
            Ok(None)
        };

        let Some(quote) = markets.iter().find(|m| m.market_id == signal.market_id) else {
            return reject(simulator, "market not in snapshot");
        };

        let state = simulator.risk_state(now.date_naive())?;

        let stake = calculate_stake(
            state.bankroll,
            signal.estimated_prob,
            signal.effective_price,
            self.kelly_fraction,
            self.max_bet_pct,
        );
        if stake <= 0.0 {
            return reject(simulator, "sizing returned zero");
        }

        let existing = match simulator.market_state(&signal.market_id)? {
            MarketState::Resolved => {
                return reject(simulator, "market already resolved");
            }
            MarketState::Open(position) => Some(position),
            MarketState::NoPosition => None,
        };

        if let Err(rejection) =
            self.risk
                .validate(signal, stake, &state, quote.volume_24h, existing.as_ref())
        {
            return reject(simulator, &rejection.to_string());
        }

        let bet = Bet {
            timestamp: now,
            market_id: signal.market_id.clone(),
            direction: signal.direction,
            stake_amount: stake,
            execution_price: signal.effective_price,
            estimated_prob: signal.estimated_prob,
            edge_at_entry: signal.edge,
            kelly_fraction_applied: self.kelly_fraction,
            mode: self.mode,
        };

        match simulator.place_bet(&bet) {
            Ok(_) => {
                simulator.store().log_signal(signal, None)?;
                if let Some(csv) = csv {
                    csv.log_signal(signal, None)?;
                    csv.log_bet(&bet)?;
                }
                Ok(Some(stake))
            }
            Err(err) => {
                // Earlier bets in this tick may have consumed the headroom
                // the sizing saw; record and move on.
                warn!("bet on {} not executed: {}", signal.market_id, err);
                simulator.store().log_signal(signal, Some(&err.to_string()))?;
                Ok(None)
            }
        }
    }
}

/// Tracking: feed resolution events through the simulator. Redeliveries and
/// unknown markets are logged no-ops inside `resolve`.
pub fn apply_resolutions(
    simulator: &mut ExecutionSimulator,
    resolutions: &[Resolution],
) -> Result<(usize, f64)> {
    let mut settled = 0usize;
    let mut realized = 0.0;
    for resolution in resolutions {
        if let Some(pnl) = simulator.resolve(resolution)? {
            settled += 1;
            realized += pnl;
        }
    }
    if settled > 0 {
        info!("settled {} position(s), realized {:+.2}", settled, realized);
    }
    Ok((settled, realized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::execution::persistence::TradeStore;
    use crate::strategies::types::Direction;
    use chrono::TimeZone;

    fn pipeline() -> DecisionPipeline {
        let risk = RiskManager::new(
            RiskConfig {
                min_edge: 0.05,
                max_concurrent_positions: 10,
                max_daily_loss_pct: 0.10,
                max_volume_pct: 0.10,
                halt_drawdown_pct: 0.25,
            },
            0.05,
        );
        DecisionPipeline::new(risk, 0.5, 0.05, TradingMode::Paper)
    }

    fn simulator(initial: f64) -> ExecutionSimulator {
        ExecutionSimulator::new(TradeStore::open(":memory:", initial).unwrap(), TradingMode::Paper)
            .unwrap()
    }

    fn market(id: &str) -> MarketQuote {
        MarketQuote {
            market_id: id.to_string(),
            question: "Q?".to_string(),
            yes_price: 0.6,
            no_price: 0.4,
            yes_ask: 0.6,
            no_ask: 0.4,
            volume_24h: 50_000.0,
            book_depth: 10_000.0,
            end_date: None,
            resolved: false,
            outcome: None,
        }
    }

    fn signal(market_id: &str, prob: f64, edge: f64) -> Signal {
        Signal {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            market_id: market_id.to_string(),
            direction: Direction::Yes,
            quoted_price: 0.6,
            effective_price: 0.6,
            estimated_prob: prob,
            edge,
            confidence: 8,
            reasoning: "test".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_act_places_accepted_signal() {
        let pipeline = pipeline();
        let mut sim = simulator(500.0);
        let markets = vec![market("m1")];

        let outcome = pipeline
            .act(
                vec![signal("m1", 0.75, 0.15)],
                &markets,
                &mut sim,
                None,
                &TradingHalt::new(),
                now(),
            )
            .unwrap();

        assert_eq!(outcome.bets_placed, 1);
        assert_eq!(outcome.rejections, 0);
        assert!(outcome.total_staked > 0.0);
        assert_eq!(sim.open_positions().unwrap().len(), 1);
        assert!(sim.bankroll().unwrap() < 500.0);
    }

    #[test]
    fn test_act_records_risk_rejection() {
        let pipeline = pipeline();
        let mut sim = simulator(500.0);
        let markets = vec![market("m1")];

        // Edge below the gate's floor even though the signal got this far.
        let outcome = pipeline
            .act(
                vec![signal("m1", 0.61, 0.03)],
                &markets,
                &mut sim,
                None,
                &TradingHalt::new(),
                now(),
            )
            .unwrap();

        assert_eq!(outcome.bets_placed, 0);
        assert_eq!(outcome.rejections, 1);
        assert!((sim.bankroll().unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_act_skips_unknown_market() {
        let pipeline = pipeline();
        let mut sim = simulator(500.0);

        let outcome = pipeline
            .act(
                vec![signal("ghost", 0.75, 0.15)],
                &[market("m1")],
                &mut sim,
                None,
                &TradingHalt::new(),
                now(),
            )
            .unwrap();

        assert_eq!(outcome.bets_placed, 0);
        assert_eq!(outcome.rejections, 1);
    }

    #[test]
    fn test_halt_suspends_new_bets() {
        let pipeline = pipeline();
        let mut sim = simulator(500.0);
        let mut halt = TradingHalt::new();
        halt.trip(crate::execution::risk::HaltReason::Drawdown(0.3), now());

        let outcome = pipeline
            .act(
                vec![signal("m1", 0.75, 0.15)],
                &[market("m1")],
                &mut sim,
                None,
                &halt,
                now(),
            )
            .unwrap();

        assert_eq!(outcome.bets_placed, 0);
        assert_eq!(outcome.rejections, 1);
        assert!((sim.bankroll().unwrap() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_resolutions_settles_and_tolerates_redelivery() {
        let pipeline = pipeline();
        let mut sim = simulator(500.0);
        pipeline
            .act(
                vec![signal("m1", 0.75, 0.15)],
                &[market("m1")],
                &mut sim,
                None,
                &TradingHalt::new(),
                now(),
            )
            .unwrap();

        let resolutions = vec![Resolution {
            market_id: "m1".to_string(),
            outcome: Direction::Yes,
            resolved_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
        }];

        let (settled, realized) = apply_resolutions(&mut sim, &resolutions).unwrap();
        assert_eq!(settled, 1);
        assert!(realized > 0.0);

        let bankroll = sim.bankroll().unwrap();
        let (settled_again, _) = apply_resolutions(&mut sim, &resolutions).unwrap();
        assert_eq!(settled_again, 0);
        assert_eq!(sim.bankroll().unwrap(), bankroll);
    }
}
