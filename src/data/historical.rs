use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::types::{Article, MarketQuote, Resolution};

/// Date-keyed JSON archive of what the agent saw each day. Live ticks append
/// to it; backtests replay it. Layout mirrors one file per day under
/// `news/`, `markets/` and `resolutions/`.
pub struct SnapshotArchive {
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct DaySnapshot {
    pub articles: Vec<Article>,
    pub markets: Vec<MarketQuote>,
    pub resolutions: Vec<Resolution>,
}

#[derive(Serialize, Deserialize)]
struct NewsFile {
    date: String,
    articles: Vec<Article>,
}

#[derive(Serialize, Deserialize)]
struct MarketsFile {
    date: String,
    markets: Vec<MarketQuote>,
}

#[derive(Serialize, Deserialize)]
struct ResolutionsFile {
    date: String,
    resolutions: Vec<Resolution>,
}

impl SnapshotArchive {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn day_path(&self, kind: &str, day: NaiveDate) -> PathBuf {
        self.base_dir.join(kind).join(format!("{}.json", day))
    }

    pub fn load_day(&self, day: NaiveDate) -> Result<DaySnapshot> {
        let articles = read_json::<NewsFile>(&self.day_path("news", day))?
            .map(|f| f.articles)
            .unwrap_or_default();
        let markets = read_json::<MarketsFile>(&self.day_path("markets", day))?
            .map(|f| f.markets)
            .unwrap_or_default();
        let resolutions = read_json::<ResolutionsFile>(&self.day_path("resolutions", day))?
            .map(|f| f.resolutions)
            .unwrap_or_default();

        Ok(DaySnapshot {
            articles,
            markets,
            resolutions,
        })
    }

    /// Overwrite the day's market snapshot. One snapshot per day is enough
    /// for replay; the latest tick wins.
    pub fn record_markets(&self, day: NaiveDate, markets: &[MarketQuote]) -> Result<()> {
        write_json(
            &self.day_path("markets", day),
            &MarketsFile {
                date: day.to_string(),
                markets: markets.to_vec(),
            },
        )
    }

    /// Merge articles into the day's news snapshot, de-duplicated by URL.
    pub fn record_articles(&self, day: NaiveDate, articles: &[Article]) -> Result<()> {
        let path = self.day_path("news", day);
        let mut merged = read_json::<NewsFile>(&path)?
            .map(|f| f.articles)
            .unwrap_or_default();

        let mut seen: HashSet<String> = merged.iter().map(|a| a.url.clone()).collect();
        for article in articles {
            if seen.insert(article.url.clone()) {
                merged.push(article.clone());
            }
        }

        write_json(
            &path,
            &NewsFile {
                date: day.to_string(),
                articles: merged,
            },
        )
    }

    /// Merge resolutions into the day's file, de-duplicated by market.
    pub fn record_resolutions(&self, day: NaiveDate, resolutions: &[Resolution]) -> Result<()> {
        if resolutions.is_empty() {
            return Ok(());
        }
        let path = self.day_path("resolutions", day);
        let mut merged = read_json::<ResolutionsFile>(&path)?
            .map(|f| f.resolutions)
            .unwrap_or_default();

        let mut seen: HashSet<String> = merged.iter().map(|r| r.market_id.clone()).collect();
        for resolution in resolutions {
            if seen.insert(resolution.market_id.clone()) {
                merged.push(resolution.clone());
            }
        }

        write_json(
            &path,
            &ResolutionsFile {
                date: day.to_string(),
                resolutions: merged,
            },
        )
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(value)?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
