//! Sentiment oracle adapter.
//!
//! Resolution order for a symbol's verdict: cache → primary oracle (liveness
//! probe, then bounded retry with exponential backoff) → one fallback attempt
//! → tagged neutral default. Oracle failures never propagate to the ranker;
//! the worst case is a degraded default, which is deliberately not cached so
//! a later cycle in the same hour bucket can try again.

use crate::collector::SignalCorpus;
use crate::config::SentimentConfig;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::sentiment::cache::VerdictCache;
use crate::sentiment::oracle::{HttpOracle, SentimentOracle};
use crate::sentiment::prompts::sentiment_prompt;
use crate::sentiment::retry::RetryPolicy;
use crate::sentiment::verdict::{extract_json, SentimentVerdict};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub struct SentimentAnalyzer {
    primary: Arc<dyn SentimentOracle>,
    fallback: Option<Arc<dyn SentimentOracle>>,
    cache: VerdictCache,
    retry: RetryPolicy,
    prompt_max_chars: usize,
}

impl SentimentAnalyzer {
    /// Wire up HTTP oracles from configuration. The fallback slot stays empty
    /// when `use_fallback_oracle` is off.
    pub fn from_config(cfg: &SentimentConfig) -> Self {
        let primary: Arc<dyn SentimentOracle> = Arc::new(HttpOracle::new(
            "primary",
            cfg.primary_url.clone(),
            cfg.primary_model.clone(),
            cfg.primary_api_key.clone(),
            cfg.request_timeout_secs,
            cfg.liveness_timeout_secs,
        ));

        let fallback: Option<Arc<dyn SentimentOracle>> = if cfg.use_fallback_oracle {
            Some(Arc::new(HttpOracle::new(
                "fallback",
                cfg.fallback_url.clone(),
                cfg.fallback_model.clone(),
                cfg.fallback_api_key.clone(),
                cfg.request_timeout_secs,
                cfg.liveness_timeout_secs,
            )))
        } else {
            None
        };

        Self::new(
            primary,
            fallback,
            VerdictCache::new(cfg.cache_ttl_secs),
            RetryPolicy::new(cfg.retries, Duration::from_secs(1)),
            cfg.prompt_max_chars,
        )
    }

    pub fn new(
        primary: Arc<dyn SentimentOracle>,
        fallback: Option<Arc<dyn SentimentOracle>>,
        cache: VerdictCache,
        retry: RetryPolicy,
        prompt_max_chars: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            retry,
            prompt_max_chars,
        }
    }

    /// Validated verdict for one symbol. Never fails; the floor is the
    /// degraded neutral default.
    pub async fn analyze(&self, coin: &str, corpus: &SignalCorpus) -> SentimentVerdict {
        self.analyze_at(coin, corpus, Utc::now()).await
    }

    pub async fn analyze_at(
        &self,
        coin: &str,
        corpus: &SignalCorpus,
        now: DateTime<Utc>,
    ) -> SentimentVerdict {
        if let Some(hit) = self.cache.get(coin, now).await {
            logger::debug(LogTag::Sentiment, &format!("Cache hit for {}", coin));
            return hit;
        }

        let prompt = sentiment_prompt(coin, corpus, self.prompt_max_chars);

        match self.query_oracles(coin, &prompt).await {
            Some(verdict) => {
                self.cache.put(coin, verdict.clone(), now).await;
                logger::info(
                    LogTag::Sentiment,
                    &format!(
                        "{}: score {} ({}), recommendation {}",
                        coin,
                        verdict.score,
                        verdict.sentiment.as_str(),
                        verdict.buy_recommendation.as_str()
                    ),
                );
                verdict
            }
            None => {
                logger::warning(
                    LogTag::Sentiment,
                    &format!("All oracle paths failed for {}, using neutral default", coin),
                );
                SentimentVerdict::neutral_default(coin)
            }
        }
    }

    /// Drop expired cache entries; called periodically by the engine.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.cache.evict_expired(now).await
    }

    async fn query_oracles(&self, coin: &str, prompt: &str) -> Option<SentimentVerdict> {
        if self.primary.is_live().await {
            for attempt in 0..self.retry.max_attempts {
                match self.query_once(self.primary.as_ref(), coin, prompt).await {
                    Ok(verdict) => return Some(verdict),
                    Err(e) => {
                        logger::warning(
                            LogTag::Sentiment,
                            &format!(
                                "Attempt {}/{} failed for {}: {}",
                                attempt + 1,
                                self.retry.max_attempts,
                                coin,
                                e
                            ),
                        );
                        if self.retry.has_next(attempt) {
                            tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        }
                    }
                }
            }
        } else {
            logger::warning(
                LogTag::Sentiment,
                &format!("Primary oracle {} is not live", self.primary.name()),
            );
        }

        // Exactly one fallback attempt; no retry loop on the paid path.
        if let Some(fallback) = &self.fallback {
            match self.query_once(fallback.as_ref(), coin, prompt).await {
                Ok(verdict) => return Some(verdict),
                Err(e) => {
                    logger::error(
                        LogTag::Sentiment,
                        &format!("Fallback oracle failed for {}: {}", coin, e),
                    );
                }
            }
        }

        None
    }

    async fn query_once(
        &self,
        oracle: &dyn SentimentOracle,
        coin: &str,
        prompt: &str,
    ) -> BotResult<SentimentVerdict> {
        let text = oracle.query(coin, prompt).await?;
        let value = extract_json(&text)
            .filter(|v| v.is_object())
            .ok_or_else(|| {
                BotError::OracleMalformed(format!(
                    "[{}] no JSON object in response for {}",
                    oracle.name(),
                    coin
                ))
            })?;
        Ok(SentimentVerdict::from_json(&value, coin))
    }
}
