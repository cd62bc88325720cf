use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::data::types::MarketQuote;

/// TTL cache over the latest quote per market. A quote that has aged past
/// the TTL is evicted on read; callers treat the miss as stale market data.
pub struct QuoteCache {
    cache: DashMap<String, CachedQuote>,
    ttl: Duration,
}

struct CachedQuote {
    quote: MarketQuote,
    fetched_at: Instant,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    pub fn insert(&self, quote: MarketQuote) {
        self.cache.insert(
            quote.market_id.clone(),
            CachedQuote {
                quote,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Get a quote if still fresh (evict on read).
    pub fn get(&self, market_id: &str) -> Option<MarketQuote> {
        let entry = self.cache.get(market_id)?;
        if entry.fetched_at.elapsed() > self.ttl {
            drop(entry);
            self.cache.remove(market_id);
            return None;
        }
        Some(entry.quote.clone())
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
