use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::data::sources::{RetryPolicy, SignalExtractor};
use crate::data::types::{Article, MarketQuote, RawSignal};

/// Client for the external relevance/probability extraction service. The
/// service receives one article plus the candidate markets and returns zero
/// or more raw signals; everything it says is re-validated downstream.
pub struct ExtractorApiClient {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    article: &'a Article,
    markets: Vec<CandidateMarket<'a>>,
}

#[derive(Debug, Serialize)]
struct CandidateMarket<'a> {
    market_id: &'a str,
    question: &'a str,
    yes_price: f64,
    no_price: f64,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    affected_markets: Vec<RawSignal>,
}

impl ExtractorApiClient {
    pub fn new(endpoint: String, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            retry,
        }
    }

    async fn extract_once(
        &self,
        article: &Article,
        markets: &[MarketQuote],
    ) -> Result<Vec<RawSignal>> {
        let request = ExtractRequest {
            article,
            markets: markets
                .iter()
                .map(|m| CandidateMarket {
                    market_id: &m.market_id,
                    question: &m.question,
                    yes_price: m.yes_price,
                    no_price: m.no_price,
                })
                .collect(),
        };

        let response: ExtractResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to call signal extractor")?
            .json()
            .await
            .context("Failed to parse extractor response")?;

        Ok(response.affected_markets)
    }
}

#[async_trait]
impl SignalExtractor for ExtractorApiClient {
    async fn extract(&self, article: &Article, markets: &[MarketQuote]) -> Result<Vec<RawSignal>> {
        self.retry
            .run("extract signals", || self.extract_once(article, markets))
            .await
    }
}
