use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;

use crate::execution::types::TradingMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub fees: FeeConfig,
    pub strategies: StrategiesConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
    pub tick_interval_secs: u64,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
    #[serde(default = "default_quote_ttl")]
    pub quote_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    pub mode: String,
    pub initial_bankroll: f64,
    pub kelly_fraction: f64,
    pub max_bet_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub min_edge: f64,
    pub max_concurrent_positions: usize,
    pub max_daily_loss_pct: f64,
    pub max_volume_pct: f64,
    pub halt_drawdown_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub taker_fee_rate: f64,
    pub slippage_coeff: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategiesConfig {
    pub news_speed: NewsSpeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsSpeedConfig {
    pub enabled: bool,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,
    #[serde(default = "default_max_markets")]
    pub max_markets_per_cycle: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BacktestConfig {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_historical_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub csv_logging: bool,
    pub csv_log_path: String,
}

fn default_snapshot_dir() -> String {
    "data/historical".to_string()
}

fn default_quote_ttl() -> u64 {
    300
}

fn default_min_confidence() -> u8 {
    6
}

fn default_max_markets() -> usize {
    5
}

fn default_historical_dir() -> String {
    "data/historical".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    pub fn trading_mode(&self) -> Result<TradingMode> {
        TradingMode::parse(&self.trading.mode)
            .with_context(|| format!("Unknown trading mode: {}", self.trading.mode))
    }

    /// Startup validation. A config that fails here must prevent the loop
    /// from starting at all.
    pub fn validate(&self) -> Result<()> {
        self.trading_mode()?;

        if self.trading.initial_bankroll <= 0.0 {
            bail!("trading.initial_bankroll must be positive");
        }
        if self.trading.kelly_fraction <= 0.0 || self.trading.kelly_fraction > 1.0 {
            bail!("trading.kelly_fraction must be in (0, 1]");
        }
        if self.trading.max_bet_pct <= 0.0 || self.trading.max_bet_pct > 1.0 {
            bail!("trading.max_bet_pct must be in (0, 1]");
        }
        if self.risk.min_edge < 0.0 {
            bail!("risk.min_edge must be non-negative");
        }
        if self.risk.max_concurrent_positions == 0 {
            bail!("risk.max_concurrent_positions must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.risk.max_daily_loss_pct) {
            bail!("risk.max_daily_loss_pct must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.risk.max_volume_pct) {
            bail!("risk.max_volume_pct must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.risk.halt_drawdown_pct) {
            bail!("risk.halt_drawdown_pct must be in [0, 1]");
        }
        if self.fees.taker_fee_rate < 0.0 || self.fees.slippage_coeff < 0.0 {
            bail!("fee parameters must be non-negative");
        }
        if self.system.tick_interval_secs == 0 {
            bail!("system.tick_interval_secs must be at least 1");
        }
        if self.strategies.news_speed.min_confidence == 0
            || self.strategies.news_speed.min_confidence > 10
        {
            bail!("strategies.news_speed.min_confidence must be in 1..=10");
        }
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start >= end {
                bail!("backtest.start_date must precede backtest.end_date");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub gamma_api_url: String,
    pub news_feed_url: String,
    pub extractor_api_url: String,
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string()),
            news_feed_url: std::env::var("NEWS_FEED_URL")
                .unwrap_or_else(|_| "http://localhost:8800/articles".to_string()),
            extractor_api_url: std::env::var("EXTRACTOR_API_URL")
                .unwrap_or_else(|_| "http://localhost:8801/extract".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        toml::from_str(
            r#"
            [system]
            database_path = "data/test.db"
            tick_interval_secs = 60

            [trading]
            mode = "paper"
            initial_bankroll = 500.0
            kelly_fraction = 0.5
            max_bet_pct = 0.05

            [risk]
            min_edge = 0.05
            max_concurrent_positions = 10
            max_daily_loss_pct = 0.10
            max_volume_pct = 0.10
            halt_drawdown_pct = 0.25

            [fees]
            taker_fee_rate = 0.02
            slippage_coeff = 0.1

            [strategies.news_speed]
            enabled = true
            min_confidence = 6
            max_markets_per_cycle = 5

            [monitoring]
            csv_logging = false
            csv_log_path = "data/trades.csv"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = sample_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading_mode().unwrap(), TradingMode::Paper);
    }

    #[test]
    fn test_invalid_kelly_fraction_rejected() {
        let mut config = sample_config();
        config.trading.kelly_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut config = sample_config();
        config.trading.mode = "margin".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backtest_window_must_be_ordered() {
        let mut config = sample_config();
        config.backtest.start_date = NaiveDate::from_ymd_opt(2026, 3, 2);
        config.backtest.end_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        assert!(config.validate().is_err());
    }
}
