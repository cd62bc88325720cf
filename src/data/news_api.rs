use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::data::sources::{NewsSource, RetryPolicy};
use crate::data::types::Article;

/// JSON news feed client. Keeps a publication-time watermark plus a seen-URL
/// set so a tick never reprocesses an article it already delivered.
pub struct NewsFeedClient {
    client: Client,
    feed_url: String,
    retry: RetryPolicy,
    state: Mutex<FetchState>,
}

#[derive(Default)]
struct FetchState {
    watermark: Option<DateTime<Utc>>,
    seen_urls: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    articles: Vec<FeedArticle>,
}

#[derive(Debug, Deserialize)]
struct FeedArticle {
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source: String,
    url: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    category: Option<String>,
}

impl NewsFeedClient {
    pub fn new(feed_url: String, retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            feed_url,
            retry,
            state: Mutex::new(FetchState::default()),
        }
    }

    async fn get_feed_once(&self) -> Result<Vec<FeedArticle>> {
        let response: FeedResponse = self
            .client
            .get(&self.feed_url)
            .send()
            .await
            .context("Failed to fetch news feed")?
            .json()
            .await
            .context("Failed to parse news feed")?;

        Ok(response.articles)
    }
}

#[async_trait]
impl NewsSource for NewsFeedClient {
    async fn fetch_new_articles(&self) -> Result<Vec<Article>> {
        let raw = self.retry.run("fetch news", || self.get_feed_once()).await?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("news fetch state poisoned"))?;
        let cutoff = state.watermark;

        let mut fresh = Vec::new();
        for entry in raw {
            if entry.headline.is_empty() || entry.url.is_empty() {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if entry.published_at <= cutoff {
                    continue;
                }
            }
            if !state.seen_urls.insert(entry.url.clone()) {
                continue;
            }
            fresh.push(Article {
                headline: entry.headline,
                summary: entry.summary,
                source: entry.source,
                url: entry.url,
                published_at: entry.published_at,
                category: entry.category,
            });
        }

        if let Some(newest) = fresh.iter().map(|a| a.published_at).max() {
            state.watermark = Some(newest);
        } else if state.watermark.is_none() {
            state.watermark = Some(Utc::now());
        }

        Ok(fresh)
    }
}
