//! Candidate ranking: technical scan → shortlist → concurrent sentiment
//! fan-out → score fusion → winner.

use crate::collector::SignalCollector;
use crate::config::BotConfig;
use crate::logger::{self, LogTag};
use crate::market::MarketData;
use crate::scorer::{self, TechScore};
use crate::sentiment::verdict::{BuyRecommendation, SentimentLabel, SentimentVerdict};
use crate::sentiment::SentimentAnalyzer;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

const TECH_WEIGHT: f64 = 0.7;
const SENTIMENT_WEIGHT: f64 = 0.3;
const RECOMMENDATION_BONUS: f64 = 50.0;

/// The most recently sold symbol; blocked from re-entry inside the cooldown
/// window.
#[derive(Debug, Clone)]
pub struct RecentSale {
    pub symbol: String,
    pub sold_at: DateTime<Utc>,
}

/// Fully fused candidate, built during ranking and discarded after selection.
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub symbol: String,
    pub tech_score: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub sentiment_score: i64,
    pub sentiment_label: SentimentLabel,
    pub buy_recommendation: BuyRecommendation,
    pub final_score: f64,
}

/// Technical score and sentiment verdict fused into the final ranking score:
/// 70% technical, 30% normalized sentiment, ±50 for an explicit YES/NO.
/// A degraded neutral default contributes nothing, leaving the candidate
/// ranked on its technicals alone.
pub fn fuse(tech: &TechScore, verdict: &SentimentVerdict) -> CandidateScore {
    let normalized_sentiment = (verdict.score - 50) as f64 * 2.0 * 5.0;
    let mut final_score =
        tech.tech_score * TECH_WEIGHT + normalized_sentiment * SENTIMENT_WEIGHT;

    match verdict.buy_recommendation {
        BuyRecommendation::Yes => final_score += RECOMMENDATION_BONUS,
        BuyRecommendation::No => final_score -= RECOMMENDATION_BONUS,
        BuyRecommendation::Neutral => {}
    }

    CandidateScore {
        symbol: tech.symbol.clone(),
        tech_score: tech.tech_score,
        stop_loss_pct: tech.stop_loss_pct,
        take_profit_pct: tech.take_profit_pct,
        sentiment_score: verdict.score,
        sentiment_label: verdict.sentiment,
        buy_recommendation: verdict.buy_recommendation,
        final_score,
    }
}

fn base_asset<'a>(symbol: &'a str, quote: &str) -> &'a str {
    symbol.strip_suffix(quote).unwrap_or(symbol)
}

pub struct CandidateRanker {
    market: Arc<dyn MarketData>,
    collector: Arc<dyn SignalCollector>,
    analyzer: Arc<SentimentAnalyzer>,
    cfg: Arc<BotConfig>,
}

impl CandidateRanker {
    pub fn new(
        market: Arc<dyn MarketData>,
        collector: Arc<dyn SignalCollector>,
        analyzer: Arc<SentimentAnalyzer>,
        cfg: Arc<BotConfig>,
    ) -> Self {
        Self {
            market,
            collector,
            analyzer,
            cfg,
        }
    }

    /// Scan the universe and pick the best entry candidate, or `None` when
    /// nothing qualifies this cycle.
    pub async fn choose_best(
        &self,
        recent_sale: Option<&RecentSale>,
        now: DateTime<Utc>,
    ) -> Option<CandidateScore> {
        let shortlist = self.technical_shortlist(recent_sale, now).await;
        if shortlist.is_empty() {
            logger::info(LogTag::Ranker, "No candidates passed the technical filter");
            return None;
        }

        logger::info(
            LogTag::Ranker,
            &format!(
                "Shortlist: {}",
                shortlist
                    .iter()
                    .map(|c| format!("{} ({:.2})", c.symbol, c.tech_score))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );

        let mut candidates = self.fan_out_sentiment(shortlist).await;

        // Stable sort keeps the technical ordering among equal final scores.
        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = candidates.into_iter().next()?;
        logger::success(
            LogTag::Ranker,
            &format!(
                "Selected {} | final {:.2} (tech {:.2}, sentiment {}/100, {})",
                best.symbol,
                best.final_score,
                best.tech_score,
                best.sentiment_score,
                best.buy_recommendation.as_str()
            ),
        );
        Some(best)
    }

    async fn technical_shortlist(
        &self,
        recent_sale: Option<&RecentSale>,
        now: DateTime<Utc>,
    ) -> Vec<TechScore> {
        let cooldown = Duration::seconds(self.cfg.trading.cooldown_time_secs);
        let universe = self.market.list_symbols().await;
        let limit = self.cfg.market.max_symbols_to_analyze;

        let mut passed = Vec::new();
        for symbol in universe.into_iter().take(limit) {
            if let Some(sale) = recent_sale {
                if sale.symbol == symbol && now - sale.sold_at < cooldown {
                    logger::debug(
                        LogTag::Ranker,
                        &format!("{} skipped, still in cooldown", symbol),
                    );
                    continue;
                }
            }

            let series = self
                .market
                .get_history(
                    &symbol,
                    &self.cfg.market.kline_interval,
                    self.cfg.market.lookback_bars,
                )
                .await;
            if series.is_empty() {
                continue;
            }

            if let Some(score) = scorer::evaluate(&series, &self.cfg.strategy) {
                passed.push(score);
            }
        }

        passed.sort_by(|a, b| {
            b.tech_score
                .partial_cmp(&a.tech_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passed.truncate(self.cfg.strategy.shortlist_size);
        passed
    }

    /// Bounded concurrent sentiment lookups for the shortlist. All dispatched
    /// calls are joined before fusing; a worker that dies ranks its candidate
    /// with the neutral default, keyed by symbol so verdicts can't be
    /// misattributed.
    async fn fan_out_sentiment(&self, shortlist: Vec<TechScore>) -> Vec<CandidateScore> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.sentiment.workers.max(1)));
        let quote = self.cfg.market.quote_asset.clone();

        let tasks: Vec<_> = shortlist
            .into_iter()
            .map(|tech| {
                let semaphore = semaphore.clone();
                let collector = self.collector.clone();
                let analyzer = self.analyzer.clone();
                let coin = base_asset(&tech.symbol, &quote).to_string();

                tokio::spawn(async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return fuse(&tech, &SentimentVerdict::neutral_default(&coin)),
                    };
                    let corpus = collector.collect(&coin).await;
                    let verdict = analyzer.analyze(&coin, &corpus).await;
                    fuse(&tech, &verdict)
                })
            })
            .collect();

        let mut fused = Vec::new();
        for result in join_all(tasks).await {
            match result {
                Ok(candidate) => fused.push(candidate),
                Err(e) => logger::error(
                    LogTag::Ranker,
                    &format!("Sentiment worker panicked: {}", e),
                ),
            }
        }
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{SignalCollector, SignalCorpus};
    use crate::config::BotConfig;
    use crate::errors::BotResult;
    use crate::market::{Candle, PriceSeries};
    use crate::sentiment::oracle::SentimentOracle;
    use crate::sentiment::{RetryPolicy, VerdictCache};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn tech(symbol: &str, score: f64) -> TechScore {
        TechScore {
            symbol: symbol.to_string(),
            tech_score: score,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            indicators: Default::default(),
        }
    }

    fn verdict(score: i64, rec: BuyRecommendation) -> SentimentVerdict {
        let mut v = SentimentVerdict::neutral_default("X");
        v.score = score;
        v.buy_recommendation = rec;
        v.degraded = false;
        v
    }

    #[test]
    fn test_fusion_with_yes_recommendation() {
        let fused = fuse(&tech("BTCUSDT", 30.0), &verdict(80, BuyRecommendation::Yes));
        // 30*0.7 + (80-50)*10*0.3 + 50
        assert!((fused.final_score - 161.0).abs() < 1e-9);
    }

    #[test]
    fn test_fusion_with_no_recommendation_penalized() {
        let fused = fuse(&tech("BTCUSDT", 30.0), &verdict(20, BuyRecommendation::No));
        // 30*0.7 + (20-50)*10*0.3 - 50
        assert!((fused.final_score - (21.0 - 90.0 - 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_default_ranks_tech_only() {
        let default = SentimentVerdict::neutral_default("BTC");
        let fused = fuse(&tech("BTCUSDT", 40.0), &default);
        assert_eq!(fused.sentiment_score, 50);
        assert!((fused.final_score - 40.0 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_equal_final_scores_preserve_tech_order() {
        let default = SentimentVerdict::neutral_default("X");
        let mut candidates = vec![
            fuse(&tech("AAAUSDT", 10.0), &default),
            fuse(&tech("BBBUSDT", 10.0), &default),
        ];
        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        assert_eq!(candidates[0].symbol, "AAAUSDT");
    }

    #[test]
    fn test_base_asset_strips_quote() {
        assert_eq!(base_asset("BTCUSDT", "USDT"), "BTC");
        assert_eq!(base_asset("WEIRD", "USDT"), "WEIRD");
    }

    // ------------------------------------------------------------------
    // End-to-end ranking with mock collaborators
    // ------------------------------------------------------------------

    struct MockMarket {
        series: HashMap<String, PriceSeries>,
    }

    impl MockMarket {
        /// Declining, slightly oscillating history passes the RSI filter.
        fn weak_series(symbol: &str, slope: f64) -> PriceSeries {
            let candles: Vec<Candle> = (0..60)
                .map(|i| {
                    let close =
                        100.0 - i as f64 * slope + if i % 2 == 0 { 0.5 } else { -0.5 };
                    Candle {
                        open_time: i as i64,
                        open: close,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 1000.0,
                    }
                })
                .collect();
            PriceSeries::new(symbol, "1h", candles)
        }
    }

    #[async_trait]
    impl MarketData for MockMarket {
        async fn list_symbols(&self) -> Vec<String> {
            let mut symbols: Vec<String> = self.series.keys().cloned().collect();
            symbols.sort();
            symbols
        }

        async fn get_history(&self, symbol: &str, _interval: &str, _lookback: usize) -> PriceSeries {
            self.series
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| PriceSeries::new(symbol, "1h", Vec::new()))
        }

        async fn get_current_price(&self, symbol: &str) -> Option<f64> {
            self.series.get(symbol).and_then(|s| s.last_close())
        }

        async fn get_quote_balance(&self) -> f64 {
            1000.0
        }

        async fn get_portfolio_value(&self) -> f64 {
            1000.0
        }
    }

    struct EmptyCollector;

    #[async_trait]
    impl SignalCollector for EmptyCollector {
        async fn collect(&self, coin: &str) -> SignalCorpus {
            SignalCorpus::empty(coin)
        }
    }

    struct FixedOracle {
        response: String,
    }

    #[async_trait]
    impl SentimentOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn is_live(&self) -> bool {
            true
        }

        async fn query(&self, _coin: &str, _prompt: &str) -> BotResult<String> {
            Ok(self.response.clone())
        }
    }

    fn ranker_with(series: HashMap<String, PriceSeries>) -> CandidateRanker {
        let analyzer = SentimentAnalyzer::new(
            Arc::new(FixedOracle {
                response: r#"{"sentiment": "neutral", "score": 50, "buy_recommendation": "NEUTRAL", "key_factors": []}"#.to_string(),
            }),
            None,
            VerdictCache::new(3600),
            RetryPolicy::immediate(1),
            4000,
        );
        CandidateRanker::new(
            Arc::new(MockMarket { series }),
            Arc::new(EmptyCollector),
            Arc::new(analyzer),
            Arc::new(BotConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_choose_best_picks_strongest_technicals() {
        let mut series = HashMap::new();
        // Steeper decline pushes RSI lower, scoring higher
        series.insert("AAAUSDT".to_string(), MockMarket::weak_series("AAAUSDT", 0.1));
        series.insert("BBBUSDT".to_string(), MockMarket::weak_series("BBBUSDT", 0.4));

        let ranker = ranker_with(series);
        let best = ranker.choose_best(None, Utc::now()).await.unwrap();
        assert_eq!(best.symbol, "BBBUSDT");
    }

    #[tokio::test]
    async fn test_cooldown_excludes_recent_sale() {
        let mut series = HashMap::new();
        series.insert("AAAUSDT".to_string(), MockMarket::weak_series("AAAUSDT", 0.4));

        let ranker = ranker_with(series);
        let now = Utc::now();
        let sale = RecentSale {
            symbol: "AAAUSDT".to_string(),
            sold_at: now - Duration::seconds(60),
        };

        assert!(ranker.choose_best(Some(&sale), now).await.is_none());

        // Outside the window the symbol is eligible again
        let old_sale = RecentSale {
            symbol: "AAAUSDT".to_string(),
            sold_at: now - Duration::seconds(7200),
        };
        assert!(ranker.choose_best(Some(&old_sale), now).await.is_some());
    }

    #[tokio::test]
    async fn test_empty_universe_returns_none() {
        let ranker = ranker_with(HashMap::new());
        assert!(ranker.choose_best(None, Utc::now()).await.is_none());
    }
}
