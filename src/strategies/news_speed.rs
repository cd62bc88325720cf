use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::NewsSpeedConfig;
use crate::data::sources::SignalExtractor;
use crate::data::types::{Article, MarketQuote};
use crate::strategies::edge::{EdgeEvaluator, SignalError};
use crate::strategies::types::{Signal, Strategy};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with",
];

/// News-speed strategy: react to fresh headlines before prices adjust.
/// Narrows the market universe per article by keyword overlap, hands the
/// shortlist to the extraction service, then re-prices every claim through
/// the edge evaluator.
pub struct NewsSpeedStrategy {
    config: NewsSpeedConfig,
    extractor: Arc<dyn SignalExtractor>,
    evaluator: EdgeEvaluator,
    max_bet_pct: f64,
    token_re: Regex,
}

impl NewsSpeedStrategy {
    pub fn new(
        config: NewsSpeedConfig,
        extractor: Arc<dyn SignalExtractor>,
        evaluator: EdgeEvaluator,
        max_bet_pct: f64,
    ) -> Self {
        Self {
            config,
            extractor,
            evaluator,
            max_bet_pct,
            token_re: Regex::new(r"[a-z0-9]+").expect("static token pattern"),
        }
    }

    fn tokenize(&self, text: &str) -> HashSet<String> {
        self.token_re
            .find_iter(&text.to_lowercase())
            .map(|m| m.as_str().to_string())
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
            .collect()
    }

    /// Rank open markets by token overlap with the article, keep the top N.
    fn select_candidate_markets<'a>(
        &self,
        article: &Article,
        markets: &'a [MarketQuote],
    ) -> Vec<&'a MarketQuote> {
        let open: Vec<&MarketQuote> = markets.iter().filter(|m| !m.resolved).collect();

        let query = format!("{}\n{}", article.headline, article.summary);
        let tokens = self.tokenize(&query);
        let max_candidates = self.config.max_markets_per_cycle.max(1);

        if tokens.is_empty() {
            return open.into_iter().take(max_candidates).collect();
        }

        let mut scored: Vec<(usize, &MarketQuote)> = open
            .iter()
            .filter_map(|market| {
                let question_tokens = self.tokenize(&market.question);
                let score = tokens.intersection(&question_tokens).count();
                (score > 0).then_some((score, *market))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.market_id.cmp(&b.1.market_id)));

        if scored.is_empty() {
            return open.into_iter().take(max_candidates).collect();
        }
        scored.into_iter().take(max_candidates).map(|(_, m)| m).collect()
    }
}

#[async_trait]
impl Strategy for NewsSpeedStrategy {
    fn name(&self) -> &'static str {
        "news_speed"
    }

    async fn generate_signals(
        &self,
        articles: &[Article],
        markets: &[MarketQuote],
        bankroll: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        if articles.is_empty() || markets.is_empty() {
            return Ok(signals);
        }

        let contemplated_stake = (self.max_bet_pct * bankroll).max(0.0);

        for article in articles {
            let candidates = self.select_candidate_markets(article, markets);
            if candidates.is_empty() {
                continue;
            }
            let candidate_quotes: Vec<MarketQuote> =
                candidates.iter().map(|m| (*m).clone()).collect();

            // Extraction is an external call; a failure here only costs this
            // article, not the tick.
            let raw_signals = match self.extractor.extract(article, &candidate_quotes).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("extraction failed for \"{}\": {:#}", article.headline, err);
                    continue;
                }
            };

            for raw in raw_signals {
                let Some(quote) = candidate_quotes.iter().find(|m| m.market_id == raw.market_id)
                else {
                    debug!(
                        "extractor referenced market {} outside the candidate set",
                        raw.market_id
                    );
                    continue;
                };

                match self.evaluator.evaluate(&raw, quote, contemplated_stake, now) {
                    Ok(Some(signal)) => signals.push(signal),
                    Ok(None) => {}
                    Err(SignalError::InvalidSignal(p)) => {
                        warn!("extractor returned invalid probability {} for {}", p, raw.market_id);
                    }
                    Err(SignalError::StaleMarketData(id)) => {
                        warn!("stale quote for market {}, skipping signal", id);
                    }
                }
            }
        }

        Ok(signals)
    }
}
