use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::agent::cycle::{apply_resolutions, CycleOutcome, DecisionPipeline};
use crate::config::{Config, RiskConfig};
use crate::data::cache::QuoteCache;
use crate::data::historical::SnapshotArchive;
use crate::data::sources::{MarketDataSource, NewsSource};
use crate::data::types::{detect_resolution, Article, MarketQuote, Resolution};
use crate::execution::risk::{RiskManager, TradingHalt};
use crate::execution::simulator::ExecutionSimulator;
use crate::execution::types::Position;
use crate::monitoring::logger::CsvLogger;
use crate::monitoring::performance::PerformanceAccountant;
use crate::strategies::types::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Sensing,
    Thinking,
    Acting,
    Tracking,
    Sleeping,
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TickPhase::Idle => "idle",
            TickPhase::Sensing => "sensing",
            TickPhase::Thinking => "thinking",
            TickPhase::Acting => "acting",
            TickPhase::Tracking => "tracking",
            TickPhase::Sleeping => "sleeping",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct AgentStatus {
    pub phase: TickPhase,
    pub open_positions: Vec<Position>,
    pub bankroll: f64,
    pub daily_pnl: f64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub halted: Option<String>,
}

/// The sense -> think -> act -> track loop. One tick at a time; a failing
/// tick is logged and slept off, never allowed to take the process down.
pub struct AgentLoop {
    interval: Duration,
    news: Arc<dyn NewsSource>,
    markets: Arc<dyn MarketDataSource>,
    strategies: Vec<Box<dyn Strategy>>,
    pipeline: DecisionPipeline,
    simulator: ExecutionSimulator,
    quotes: QuoteCache,
    archive: SnapshotArchive,
    csv: Option<CsvLogger>,
    halt: TradingHalt,
    risk_config: RiskConfig,
    phase: TickPhase,
    last_tick_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl AgentLoop {
    pub fn new(
        config: &Config,
        news: Arc<dyn NewsSource>,
        markets: Arc<dyn MarketDataSource>,
        strategies: Vec<Box<dyn Strategy>>,
        simulator: ExecutionSimulator,
    ) -> Result<Self> {
        let risk = RiskManager::new(config.risk.clone(), config.trading.max_bet_pct);
        let pipeline = DecisionPipeline::new(
            risk,
            config.trading.kelly_fraction,
            config.trading.max_bet_pct,
            simulator.mode(),
        );

        let csv = if config.monitoring.csv_logging {
            Some(CsvLogger::new(config.monitoring.csv_log_path.clone())?)
        } else {
            None
        };

        Ok(Self {
            interval: Duration::from_secs(config.system.tick_interval_secs),
            news,
            markets,
            strategies,
            pipeline,
            simulator,
            quotes: QuoteCache::new(Duration::from_secs(config.system.quote_ttl_secs)),
            archive: SnapshotArchive::new(config.system.snapshot_dir.clone()),
            csv,
            halt: TradingHalt::new(),
            risk_config: config.risk.clone(),
            phase: TickPhase::Idle,
            last_tick_at: None,
            last_error: None,
        })
    }

    /// Tick at the configured interval until a stop signal arrives. The
    /// ticker skips rather than queues when a tick overruns, and the stop
    /// signal is only honored between ticks, so the current tick always
    /// finishes.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "starting agent loop (mode={}, interval={}s, {} strategies)",
            self.simulator.mode(),
            self.interval.as_secs(),
            self.strategies.len()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("stop signal received, shutting down");
                    break;
                }
            }
        }

        let status = self.status()?;
        info!(
            "final status: bankroll ${:.2}, {} open position(s), daily P&L {:+.2}",
            status.bankroll,
            status.open_positions.len(),
            status.daily_pnl
        );
        Ok(())
    }

    /// One full cycle. Errors land in `last_error`; bets committed before a
    /// failure stay committed.
    pub async fn run_tick(&mut self) {
        let started = Utc::now();
        match self.tick_inner(started).await {
            Ok(outcome) => {
                self.last_error = None;
                info!(
                    "tick complete: {} signal(s), {} bet(s) (${:.2} staked), {} rejection(s)",
                    outcome.signals, outcome.bets_placed, outcome.total_staked, outcome.rejections
                );
            }
            Err(err) => {
                error!("tick failed during {}: {:#}", self.phase, err);
                self.last_error = Some(format!("{:#}", err));
            }
        }
        self.phase = TickPhase::Sleeping;
        self.last_tick_at = Some(started);
    }

    async fn tick_inner(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let day = now.date_naive();

        // Sensing: everything external happens here, behind retries.
        self.phase = TickPhase::Sensing;
        let articles = self.news.fetch_new_articles().await?;
        let markets = self.markets.fetch_markets().await?;
        for quote in &markets {
            self.quotes.insert(quote.clone());
        }
        self.record_snapshots(day, &articles, &markets);

        // Thinking.
        self.phase = TickPhase::Thinking;
        let bankroll = self.simulator.bankroll()?;
        let signals = self
            .pipeline
            .think(&self.strategies, &articles, &markets, bankroll, now)
            .await?;

        // Acting.
        self.phase = TickPhase::Acting;
        let outcome = self.pipeline.act(
            signals,
            &markets,
            &mut self.simulator,
            self.csv.as_ref(),
            &self.halt,
            now,
        )?;

        // Tracking: settle resolved markets, sample equity, refresh policy.
        self.phase = TickPhase::Tracking;
        let resolutions = self.detect_resolutions(&markets, now).await?;
        apply_resolutions(&mut self.simulator, &resolutions)?;
        if !resolutions.is_empty() {
            if let Err(err) = self.archive.record_resolutions(day, &resolutions) {
                warn!("failed to archive resolutions: {:#}", err);
            }
        }

        self.simulator.sample_equity(day)?;
        let report = PerformanceAccountant::report(self.simulator.store())?;
        let state = self.simulator.risk_state(day)?;
        self.halt.evaluate(report.max_drawdown, &state, &self.risk_config, now);

        Ok(outcome)
    }

    /// Snapshot the day's inputs for later backtest replay. Best effort; a
    /// full disk must not fail the tick.
    fn record_snapshots(&self, day: NaiveDate, articles: &[Article], markets: &[MarketQuote]) {
        if !markets.is_empty() {
            if let Err(err) = self.archive.record_markets(day, markets) {
                warn!("failed to archive market snapshot: {:#}", err);
            }
        }
        if !articles.is_empty() {
            if let Err(err) = self.archive.record_articles(day, articles) {
                warn!("failed to archive news snapshot: {:#}", err);
            }
        }
    }

    /// Check each open position's market for a final outcome. Per-market
    /// fetch failures cost only that market, only this tick.
    async fn detect_resolutions(
        &self,
        markets: &[MarketQuote],
        now: DateTime<Utc>,
    ) -> Result<Vec<Resolution>> {
        let mut resolutions = Vec::new();

        for position in self.simulator.open_positions()? {
            let quote = markets
                .iter()
                .find(|m| m.market_id == position.market_id)
                .cloned()
                .or_else(|| self.quotes.get(&position.market_id));

            let quote = match quote {
                Some(quote) => quote,
                None => match self.markets.fetch_market(&position.market_id).await {
                    Ok(Some(quote)) => {
                        self.quotes.insert(quote.clone());
                        quote
                    }
                    Ok(None) => {
                        warn!("market {} vanished from the venue", position.market_id);
                        continue;
                    }
                    Err(err) => {
                        warn!(
                            "failed to refresh {} for resolution check: {:#}",
                            position.market_id, err
                        );
                        continue;
                    }
                },
            };

            if let Some(resolution) = detect_resolution(&quote, now) {
                resolutions.push(resolution);
            }
        }

        Ok(resolutions)
    }

    pub fn status(&self) -> Result<AgentStatus> {
        let today = Utc::now().date_naive();
        let state = self.simulator.risk_state(today)?;
        Ok(AgentStatus {
            phase: self.phase,
            open_positions: self.simulator.open_positions()?,
            bankroll: state.bankroll,
            daily_pnl: state.daily_pnl,
            last_tick_at: self.last_tick_at,
            last_error: self.last_error.clone(),
            halted: self.halt.reason().map(|r| r.to_string()),
        })
    }
}
