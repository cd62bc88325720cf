use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::agent::cycle::{apply_resolutions, DecisionPipeline};
use crate::config::{Config, RiskConfig};
use crate::data::historical::SnapshotArchive;
use crate::execution::persistence::TradeStore;
use crate::execution::risk::{RiskManager, TradingHalt};
use crate::execution::simulator::ExecutionSimulator;
use crate::execution::types::{EquitySample, ResolvedBet, TradingMode};
use crate::monitoring::performance::PerformanceAccountant;
use crate::strategies::types::Strategy;

#[derive(Debug, Serialize)]
pub struct BacktestReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub total_pnl: f64,
    pub num_trades: usize,
    pub win_rate: f64,
    pub avg_edge: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub equity_curve: Vec<EquitySample>,
    pub trades: Vec<ResolvedBet>,
}

/// Replays the archived timeline through the live decision pipeline, one
/// day per tick. Fully synchronous over days and deterministic: the same
/// archive and config must reproduce the same bet sequence and final
/// bankroll, run after run.
pub struct BacktestRunner {
    archive: SnapshotArchive,
    strategies: Vec<Box<dyn Strategy>>,
    pipeline: DecisionPipeline,
    simulator: ExecutionSimulator,
    halt: TradingHalt,
    risk_config: RiskConfig,
    start: NaiveDate,
    end: NaiveDate,
    initial_bankroll: f64,
}

impl BacktestRunner {
    pub fn new(
        config: &Config,
        archive: SnapshotArchive,
        strategies: Vec<Box<dyn Strategy>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self> {
        if start >= end {
            bail!("backtest window is empty: {} >= {}", start, end);
        }

        let store = TradeStore::open(":memory:", config.trading.initial_bankroll)?;
        let simulator = ExecutionSimulator::new(store, TradingMode::Backtest)?;
        let risk = RiskManager::new(config.risk.clone(), config.trading.max_bet_pct);
        let pipeline = DecisionPipeline::new(
            risk,
            config.trading.kelly_fraction,
            config.trading.max_bet_pct,
            TradingMode::Backtest,
        );

        Ok(Self {
            archive,
            strategies,
            pipeline,
            simulator,
            halt: TradingHalt::new(),
            risk_config: config.risk.clone(),
            start,
            end,
            initial_bankroll: config.trading.initial_bankroll,
        })
    }

    /// Iterate [start, end): replay each day's snapshot through the shared
    /// pipeline, apply the day's resolutions, append one equity sample.
    pub async fn run(&mut self) -> Result<BacktestReport> {
        info!("backtest {} -> {} starting", self.start, self.end);

        let mut day = self.start;
        while day < self.end {
            let snapshot = self.archive.load_day(day)?;
            // The replay clock: midday keeps the tick's date unambiguous.
            let now = day.and_hms_opt(12, 0, 0).expect("valid time").and_utc();

            let bankroll = self.simulator.bankroll()?;
            let signals = self
                .pipeline
                .think(
                    &self.strategies,
                    &snapshot.articles,
                    &snapshot.markets,
                    bankroll,
                    now,
                )
                .await?;
            debug!("{}: {} signal(s)", day, signals.len());

            self.pipeline.act(
                signals,
                &snapshot.markets,
                &mut self.simulator,
                None,
                &self.halt,
                now,
            )?;

            apply_resolutions(&mut self.simulator, &snapshot.resolutions)?;
            self.simulator.sample_equity(day)?;

            let report = PerformanceAccountant::report(self.simulator.store())?;
            let state = self.simulator.risk_state(day)?;
            self.halt
                .evaluate(report.max_drawdown, &state, &self.risk_config, now);

            day = day.succ_opt().expect("date overflow");
        }

        self.build_report()
    }

    fn build_report(&self) -> Result<BacktestReport> {
        let store = self.simulator.store();
        let performance = PerformanceAccountant::report(store)?;
        let final_bankroll = self.simulator.bankroll()?;

        Ok(BacktestReport {
            start: self.start,
            end: self.end,
            initial_bankroll: self.initial_bankroll,
            final_bankroll,
            total_pnl: performance.total_pnl,
            num_trades: performance.num_bets,
            win_rate: performance.win_rate,
            avg_edge: performance.avg_edge,
            sharpe_ratio: performance.sharpe_ratio,
            max_drawdown: performance.max_drawdown,
            equity_curve: store.equity_series()?,
            trades: store.resolved_bets()?,
        })
    }
}
