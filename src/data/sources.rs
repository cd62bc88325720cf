use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::data::types::{Article, MarketQuote, RawSignal};

/// Produces a finite, de-duplicated batch of articles newer than the
/// source's internal watermark. Re-fetching must not replay seen articles.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_new_articles(&self) -> Result<Vec<Article>>;
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<Vec<MarketQuote>>;

    async fn fetch_market(&self, market_id: &str) -> Result<Option<MarketQuote>>;
}

/// Relevance/probability extraction over an article and a candidate market
/// list. Output is untrusted and re-validated downstream.
#[async_trait]
pub trait SignalExtractor: Send + Sync {
    async fn extract(&self, article: &Article, markets: &[MarketQuote]) -> Result<Vec<RawSignal>>;
}

/// Timeout plus bounded exponential backoff for external calls. Exhausting
/// the attempts is a soft failure for the current tick, never a crash.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut last_err = anyhow!("{} failed with no attempts", op_name);

        for attempt in 1..=self.max_attempts {
            match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    warn!("{} failed (attempt {}/{}): {:#}", op_name, attempt, self.max_attempts, err);
                    last_err = err;
                }
                Err(_) => {
                    warn!(
                        "{} timed out after {:?} (attempt {}/{})",
                        op_name, self.call_timeout, attempt, self.max_attempts
                    );
                    last_err = anyhow!("{} timed out after {:?}", op_name, self.call_timeout);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.max_backoff);
            }
        }

        Err(last_err)
    }
}
