mod agent;
mod config;
mod data;
mod execution;
mod monitoring;
mod strategies;

use anyhow::{bail, Result};
use std::sync::Arc;

use agent::backtest::BacktestRunner;
use agent::runner::AgentLoop;
use config::{Config, EnvConfig};
use data::extractor_api::ExtractorApiClient;
use data::historical::SnapshotArchive;
use data::markets_api::GammaApiClient;
use data::news_api::NewsFeedClient;
use data::sources::RetryPolicy;
use execution::persistence::TradeStore;
use execution::simulator::ExecutionSimulator;
use execution::types::TradingMode;
use strategies::edge::{EdgeEvaluator, FeeModel};
use strategies::news_speed::NewsSpeedStrategy;
use strategies::types::Strategy;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("newsbet starting...");

    let config = Config::load("config.toml")?;
    config.validate()?;
    let env_config = EnvConfig::load()?;

    let mode = config.trading_mode()?;
    tracing::info!("mode: {}", mode);
    tracing::info!("bankroll: ${:.2}", config.trading.initial_bankroll);
    tracing::info!(
        "kelly fraction: {}, max bet: {:.0}% of bankroll",
        config.trading.kelly_fraction,
        config.trading.max_bet_pct * 100.0
    );

    match mode {
        TradingMode::Backtest => run_backtest(&config, &env_config).await,
        TradingMode::Paper => run_paper(&config, &env_config).await,
        TradingMode::Live => {
            bail!("live order routing is not wired up; use paper mode against live data")
        }
    }
}

fn build_strategies(config: &Config, env_config: &EnvConfig) -> Result<Vec<Box<dyn Strategy>>> {
    let evaluator = EdgeEvaluator::new(
        FeeModel {
            taker_fee_rate: config.fees.taker_fee_rate,
            slippage_coeff: config.fees.slippage_coeff,
        },
        config.risk.min_edge,
        config.strategies.news_speed.min_confidence,
    );

    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    if config.strategies.news_speed.enabled {
        let extractor = Arc::new(ExtractorApiClient::new(
            env_config.extractor_api_url.clone(),
            RetryPolicy::default(),
        ));
        strategies.push(Box::new(NewsSpeedStrategy::new(
            config.strategies.news_speed.clone(),
            extractor,
            evaluator,
            config.trading.max_bet_pct,
        )));
    }

    if strategies.is_empty() {
        bail!("no strategies enabled in config");
    }
    Ok(strategies)
}

async fn run_paper(config: &Config, env_config: &EnvConfig) -> Result<()> {
    let retry = RetryPolicy::default();
    let news = Arc::new(NewsFeedClient::new(
        env_config.news_feed_url.clone(),
        retry.clone(),
    ));
    let markets = Arc::new(GammaApiClient::new(
        env_config.gamma_api_url.clone(),
        retry,
    ));

    let store = TradeStore::open(&config.system.database_path, config.trading.initial_bankroll)?;
    let simulator = ExecutionSimulator::new(store, TradingMode::Paper)?;

    let strategies = build_strategies(config, env_config)?;
    let mut agent = AgentLoop::new(config, news, markets, strategies, simulator)?;
    agent.run().await
}

async fn run_backtest(config: &Config, env_config: &EnvConfig) -> Result<()> {
    let (Some(start), Some(end)) = (config.backtest.start_date, config.backtest.end_date) else {
        bail!("backtest mode needs backtest.start_date and backtest.end_date");
    };

    let archive = SnapshotArchive::new(config.backtest.data_dir.clone());
    let strategies = build_strategies(config, env_config)?;
    let mut runner = BacktestRunner::new(config, archive, strategies, start, end)?;

    let report = runner.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
