//! Raw-text signal collection for the sentiment oracle.
//!
//! Sources are best-effort: every failure degrades to an empty item list so a
//! dead source never blocks the cycle. Items are truncated here so the prompt
//! builder works with bounded text.

use crate::config::CollectorConfig;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ITEM_TEXT_MAX_CHARS: usize = 1000;
const REDDIT_SUBREDDITS: &[&str] = &["CryptoCurrency", "CryptoMarkets"];

/// One collected text item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusItem {
    pub title: String,
    pub text: String,
    pub source: String,
}

/// Everything collected for one symbol, grouped by source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCorpus {
    pub symbol: String,
    pub reddit: Vec<CorpusItem>,
    pub news: Vec<CorpusItem>,
    pub twitter: Vec<CorpusItem>,
    pub collected_at: DateTime<Utc>,
}

impl SignalCorpus {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            reddit: Vec::new(),
            news: Vec::new(),
            twitter: Vec::new(),
            collected_at: Utc::now(),
        }
    }

    pub fn total_items(&self) -> usize {
        self.reddit.len() + self.news.len() + self.twitter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

#[async_trait]
pub trait SignalCollector: Send + Sync {
    /// Collect the raw text corpus for a base asset (e.g. "BTC").
    async fn collect(&self, coin: &str) -> SignalCorpus;
}

/// Maps short tickers to the names people actually write.
fn common_name(coin: &str) -> Option<&'static str> {
    match coin {
        "BTC" => Some("Bitcoin"),
        "ETH" => Some("Ethereum"),
        "SOL" => Some("Solana"),
        "ADA" => Some("Cardano"),
        "DOT" => Some("Polkadot"),
        "AVAX" => Some("Avalanche"),
        "DOGE" => Some("Dogecoin"),
        "XRP" => Some("Ripple"),
        "BNB" => Some("Binance Coin"),
        _ => None,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ============================================================================
// HTTP COLLECTOR (NewsAPI + public Reddit search)
// ============================================================================

pub struct HttpCollector {
    client: reqwest::Client,
    cfg: CollectorConfig,
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    articles: Vec<NewsArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: NewsSource,
}

#[derive(Debug, Default, Deserialize)]
struct NewsSource {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RedditListing {
    data: RedditListingData,
}

#[derive(Debug, Deserialize)]
struct RedditListingData {
    #[serde(default)]
    children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
}

impl HttpCollector {
    pub fn new(cfg: CollectorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .user_agent("sentibot/0.1")
            .build()
            .unwrap_or_default();
        Self { client, cfg }
    }

    fn search_term(coin: &str) -> String {
        match common_name(coin) {
            Some(name) => format!("{} crypto", name),
            None => format!("{} crypto", coin),
        }
    }

    async fn fetch_news(&self, coin: &str) -> Vec<CorpusItem> {
        if self.cfg.news_api_key.is_empty() {
            return Vec::new();
        }

        let url = format!(
            "https://newsapi.org/v2/everything?q={}&sortBy=publishedAt&pageSize={}&apiKey={}",
            Self::search_term(coin),
            self.cfg.news_page_size,
            self.cfg.news_api_key
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                logger::warning(LogTag::Collector, &format!("News request failed: {}", e));
                return Vec::new();
            }
        };

        let parsed: NewsResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                logger::warning(LogTag::Collector, &format!("News response unreadable: {}", e));
                return Vec::new();
            }
        };

        parsed
            .articles
            .into_iter()
            .map(|article| CorpusItem {
                title: article.title,
                text: truncate_chars(
                    article.description.as_deref().unwrap_or(""),
                    ITEM_TEXT_MAX_CHARS,
                ),
                source: if article.source.name.is_empty() {
                    "news".to_string()
                } else {
                    article.source.name
                },
            })
            .collect()
    }

    async fn fetch_reddit(&self, coin: &str) -> Vec<CorpusItem> {
        let mut items = Vec::new();

        for subreddit in REDDIT_SUBREDDITS {
            let url = format!(
                "https://www.reddit.com/r/{}/search.json?q={}&restrict_sr=1&t=week&limit={}",
                subreddit, coin, self.cfg.reddit_limit
            );

            let listing: RedditListing = match self.client.get(&url).send().await {
                Ok(response) => match response.json().await {
                    Ok(l) => l,
                    Err(e) => {
                        logger::debug(
                            LogTag::Collector,
                            &format!("r/{} response unreadable: {}", subreddit, e),
                        );
                        continue;
                    }
                },
                Err(e) => {
                    logger::debug(
                        LogTag::Collector,
                        &format!("r/{} request failed: {}", subreddit, e),
                    );
                    continue;
                }
            };

            for child in listing.data.children {
                if child.data.selftext.is_empty() {
                    continue;
                }
                items.push(CorpusItem {
                    title: child.data.title,
                    text: truncate_chars(&child.data.selftext, ITEM_TEXT_MAX_CHARS),
                    source: format!("r/{}", subreddit),
                });
            }
        }

        items
    }
}

#[async_trait]
impl SignalCollector for HttpCollector {
    async fn collect(&self, coin: &str) -> SignalCorpus {
        let (reddit, news) = tokio::join!(self.fetch_reddit(coin), self.fetch_news(coin));

        let corpus = SignalCorpus {
            symbol: coin.to_string(),
            reddit,
            news,
            // No API credentials wired up; kept as a distinct source so the
            // prompt layout doesn't change when it lands.
            twitter: Vec::new(),
            collected_at: Utc::now(),
        };

        logger::info(
            LogTag::Collector,
            &format!("Collected {} items for {}", corpus.total_items(), coin),
        );
        corpus
    }
}
