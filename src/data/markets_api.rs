use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::data::sources::{MarketDataSource, RetryPolicy};
use crate::data::types::MarketQuote;
use crate::strategies::types::Direction;

pub struct GammaApiClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    id: String,
    question: String,
    #[serde(default)]
    end_date_iso: Option<String>,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    yes_price: Option<f64>,
    #[serde(default)]
    no_price: Option<f64>,
    #[serde(default)]
    yes_ask: Option<f64>,
    #[serde(default)]
    no_ask: Option<f64>,
    #[serde(default)]
    volume_24h: Option<String>,
    #[serde(default)]
    liquidity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GammaMarketsResponse {
    #[serde(default)]
    data: Vec<GammaMarket>,
}

impl GammaApiClient {
    pub fn new(base_url: String, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            base_url,
            retry,
        }
    }

    async fn get_markets_once(&self) -> Result<Vec<MarketQuote>> {
        let url = format!("{}/markets", self.base_url);

        let response: GammaMarketsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch markets")?
            .json()
            .await
            .context("Failed to parse markets response")?;

        Ok(response.data.into_iter().map(convert_gamma_market).collect())
    }

    async fn get_market_once(&self, market_id: &str) -> Result<Option<MarketQuote>> {
        let url = format!("{}/markets/{}", self.base_url, market_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch market {}", market_id))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let market: GammaMarket = response
            .json()
            .await
            .with_context(|| format!("Failed to parse market {}", market_id))?;

        Ok(Some(convert_gamma_market(market)))
    }
}

#[async_trait]
impl MarketDataSource for GammaApiClient {
    async fn fetch_markets(&self) -> Result<Vec<MarketQuote>> {
        self.retry
            .run("fetch markets", || self.get_markets_once())
            .await
    }

    async fn fetch_market(&self, market_id: &str) -> Result<Option<MarketQuote>> {
        self.retry
            .run("fetch market", || self.get_market_once(market_id))
            .await
    }
}

fn convert_gamma_market(gm: GammaMarket) -> MarketQuote {
    let end_date = gm
        .end_date_iso
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let volume_24h = gm
        .volume_24h
        .as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);

    let liquidity = gm
        .liquidity
        .as_deref()
        .and_then(|l| l.parse::<f64>().ok())
        .unwrap_or(0.0);

    let yes_price = gm.yes_price.unwrap_or(0.5);
    let no_price = gm.no_price.unwrap_or(1.0 - yes_price);

    MarketQuote {
        market_id: gm.id,
        question: gm.question,
        yes_price,
        no_price,
        yes_ask: gm.yes_ask.unwrap_or(yes_price),
        no_ask: gm.no_ask.unwrap_or(no_price),
        volume_24h,
        // The feed reports total book liquidity; split it across both sides.
        book_depth: liquidity / 2.0,
        end_date,
        resolved: gm.closed,
        outcome: gm.outcome.as_deref().and_then(Direction::parse),
    }
}
