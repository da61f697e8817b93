//! The decision engine: one `run_cycle` per scheduler tick.
//!
//! Control flow per cycle: risk gate → (no position) rank candidates and open
//! the winner; (position open) trailing-stop upkeep, exit evaluation and P&L
//! realization. All trading state lives in an owned context passed through
//! the cycle; there are no process-wide globals in the decision path.

use crate::collector::SignalCollector;
use crate::config::BotConfig;
use crate::logger::{self, LogTag};
use crate::market::{MarketData, OrderGateway};
use crate::persistence::{self, EngineSnapshot};
use crate::ranker::{CandidateRanker, RecentSale};
use crate::risk::RiskGovernor;
use crate::sentiment::SentimentAnalyzer;
use crate::trader::{ManageOutcome, Position, PositionManager};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Cycles between verdict-cache eviction sweeps.
const CACHE_EVICTION_CYCLES: u64 = 12;

/// Owned trading state threaded through cycles. The position slot is the
/// single source of truth: at most one open position system-wide.
#[derive(Debug, Default)]
struct EngineState {
    position: Option<Position>,
    recent_sale: Option<RecentSale>,
}

pub struct Engine {
    cfg: Arc<BotConfig>,
    ranker: CandidateRanker,
    manager: PositionManager,
    governor: RiskGovernor,
    analyzer: Arc<SentimentAnalyzer>,
    state: EngineState,
    cycle_count: u64,
}

impl Engine {
    pub fn new(
        cfg: Arc<BotConfig>,
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        collector: Arc<dyn SignalCollector>,
        analyzer: Arc<SentimentAnalyzer>,
    ) -> Self {
        let ranker = CandidateRanker::new(
            market.clone(),
            collector,
            analyzer.clone(),
            cfg.clone(),
        );
        let manager = PositionManager::new(market, gateway, cfg.clone());
        let governor = RiskGovernor::new(&cfg.trading, Utc::now());

        Self {
            cfg,
            ranker,
            manager,
            governor,
            analyzer,
            state: EngineState::default(),
            cycle_count: 0,
        }
    }

    /// Run one decision cycle. Returns whether an action (entry or exit) was
    /// taken. Failures degrade the cycle, never kill it.
    pub async fn run_cycle(&mut self) -> bool {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> bool {
        self.cycle_count += 1;
        logger::info(
            LogTag::Engine,
            &format!("── Cycle {} ──", self.cycle_count),
        );

        if self.cycle_count % CACHE_EVICTION_CYCLES == 0 {
            let removed = self.analyzer.evict_expired(now).await;
            if removed > 0 {
                logger::debug(
                    LogTag::Engine,
                    &format!("Evicted {} expired sentiment cache entries", removed),
                );
            }
        }

        let action_taken = match self.state.position.take() {
            Some(position) => self.manage_open_position(position, now).await,
            None => self.try_open_position(now).await,
        };

        if action_taken {
            self.persist();
        }
        action_taken
    }

    async fn manage_open_position(&mut self, mut position: Position, now: DateTime<Utc>) -> bool {
        match self.manager.manage(&mut position, now).await {
            Ok(ManageOutcome::Held) => {
                self.state.position = Some(position);
                false
            }
            Ok(ManageOutcome::Closed(outcome)) => {
                self.governor.record_trade(outcome.realized_pnl, now);
                self.state.recent_sale = Some(RecentSale {
                    symbol: outcome.symbol,
                    sold_at: now,
                });
                true
            }
            Ok(ManageOutcome::ForceReset) => {
                logger::warning(
                    LogTag::Engine,
                    &format!("Position slot force-reset for {}", position.symbol),
                );
                true
            }
            Err(e) => {
                // Position retained; re-evaluated next cycle
                logger::error(
                    LogTag::Engine,
                    &format!("Management pass failed: {}", e),
                );
                self.state.position = Some(position);
                false
            }
        }
    }

    async fn try_open_position(&mut self, now: DateTime<Utc>) -> bool {
        if self.governor.daily_loss_reached(now) {
            return false;
        }
        if !self.governor.can_open_new_trade(now) {
            return false;
        }

        let candidate = match self
            .ranker
            .choose_best(self.state.recent_sale.as_ref(), now)
            .await
        {
            Some(c) => c,
            None => {
                logger::info(LogTag::Engine, "No suitable candidate this cycle");
                return false;
            }
        };

        match self.manager.open(&candidate, now).await {
            Ok(position) => {
                self.state.position = Some(position);
                true
            }
            Err(e) => {
                logger::warning(
                    LogTag::Engine,
                    &format!("Entry for {} aborted: {}", candidate.symbol, e),
                );
                false
            }
        }
    }

    /// Current state for external persistence.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            position: self.state.position.clone(),
            risk: self.governor.snapshot(),
            updated_at: Utc::now(),
        }
    }

    pub fn has_open_position(&self) -> bool {
        self.state.position.is_some()
    }

    fn persist(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = persistence::save_snapshot(&self.cfg.state_file, &snapshot) {
            logger::warning(LogTag::Engine, &format!("State snapshot failed: {}", e));
        }
    }

    /// Fixed-interval decision loop. Finishes the in-flight cycle on shutdown
    /// and skips the remaining wait.
    pub async fn run_loop(&mut self, shutdown: Arc<Notify>) {
        let interval = Duration::from_secs(self.cfg.cycle_interval_secs);
        logger::info(
            LogTag::Engine,
            &format!("Decision loop started, interval {}s", interval.as_secs()),
        );

        loop {
            let action = self.run_cycle().await;
            logger::info(
                LogTag::Engine,
                &format!(
                    "Cycle complete ({}), next in {}s",
                    if action { "action taken" } else { "no action" },
                    interval.as_secs()
                ),
            );

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.notified() => {
                    logger::info(LogTag::Engine, "Shutdown requested, leaving decision loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{SignalCollector, SignalCorpus};
    use crate::errors::BotResult;
    use crate::market::{Candle, FillResult, PriceSeries};
    use crate::sentiment::oracle::SentimentOracle;
    use crate::sentiment::{RetryPolicy, VerdictCache};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedMarket {
        current_price: Mutex<f64>,
        universe_calls: AtomicUsize,
    }

    impl ScriptedMarket {
        fn new(price: f64) -> Arc<Self> {
            Arc::new(Self {
                current_price: Mutex::new(price),
                universe_calls: AtomicUsize::new(0),
            })
        }

        fn set_price(&self, price: f64) {
            *self.current_price.lock().unwrap() = price;
        }
    }

    #[async_trait]
    impl MarketData for ScriptedMarket {
        async fn list_symbols(&self) -> Vec<String> {
            self.universe_calls.fetch_add(1, Ordering::SeqCst);
            vec!["AAAUSDT".to_string()]
        }

        async fn get_history(&self, symbol: &str, _i: &str, _l: usize) -> PriceSeries {
            // Declining, oscillating series that passes the RSI filter
            let candles: Vec<Candle> = (0..60)
                .map(|i| {
                    let close =
                        100.0 - i as f64 * 0.4 + if i % 2 == 0 { 0.5 } else { -0.5 };
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

        async fn get_current_price(&self, _symbol: &str) -> Option<f64> {
            Some(*self.current_price.lock().unwrap())
        }

        async fn get_quote_balance(&self) -> f64 {
            1000.0
        }

        async fn get_portfolio_value(&self) -> f64 {
            1000.0
        }
    }

    struct ScriptedGateway;

    #[async_trait]
    impl OrderGateway for ScriptedGateway {
        async fn buy(&self, _symbol: &str, quote_amount: f64) -> Option<FillResult> {
            Some(FillResult {
                avg_price: 100.0,
                qty: quote_amount / 100.0,
                gross_quote: quote_amount,
                fees: quote_amount * 0.001,
                fee_asset: "USDT".to_string(),
                timestamp: Utc::now(),
            })
        }

        async fn sell(&self, _symbol: &str, qty: f64) -> Option<FillResult> {
            let price = 80.0;
            Some(FillResult {
                avg_price: price,
                qty,
                gross_quote: qty * price,
                fees: qty * price * 0.001,
                fee_asset: "USDT".to_string(),
                timestamp: Utc::now(),
            })
        }

        async fn get_base_balance(&self, _symbol: &str) -> f64 {
            9.5
        }
    }

    struct EmptyCollector;

    #[async_trait]
    impl SignalCollector for EmptyCollector {
        async fn collect(&self, coin: &str) -> SignalCorpus {
            SignalCorpus::empty(coin)
        }
    }

    struct NeutralOracle;

    #[async_trait]
    impl SentimentOracle for NeutralOracle {
        fn name(&self) -> &str {
            "neutral"
        }

        async fn is_live(&self) -> bool {
            true
        }

        async fn query(&self, _coin: &str, _prompt: &str) -> BotResult<String> {
            Ok(r#"{"sentiment": "neutral", "score": 50, "buy_recommendation": "NEUTRAL", "key_factors": []}"#.to_string())
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-04T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine_with(market: Arc<ScriptedMarket>, cfg: BotConfig) -> Engine {
        let analyzer = Arc::new(SentimentAnalyzer::new(
            Arc::new(NeutralOracle),
            None,
            VerdictCache::new(3600),
            RetryPolicy::immediate(1),
            4000,
        ));
        let mut cfg = cfg;
        cfg.state_file = std::env::temp_dir()
            .join(format!("sentibot_test_state_{}.json", std::process::id()))
            .to_string_lossy()
            .to_string();
        Engine::new(
            Arc::new(cfg),
            market,
            Arc::new(ScriptedGateway),
            Arc::new(EmptyCollector),
            analyzer,
        )
    }

    #[tokio::test]
    async fn test_full_position_round_trip_keeps_single_slot() {
        let market = ScriptedMarket::new(100.0);
        let mut engine = engine_with(market.clone(), BotConfig::default());
        let t0 = t0();

        // Cycle 1: no position, ranker consulted, entry taken
        assert!(engine.run_cycle_at(t0).await);
        assert!(engine.has_open_position());
        assert_eq!(market.universe_calls.load(Ordering::SeqCst), 1);

        // Cycle 2: position held; the ranker is not consulted while the slot
        // is occupied, so a second position can never appear
        let t1 = t0 + ChronoDuration::seconds(900);
        assert!(!engine.run_cycle_at(t1).await);
        assert!(engine.has_open_position());
        assert_eq!(market.universe_calls.load(Ordering::SeqCst), 1);

        // Cycle 3: price collapses through the stop; position closes
        market.set_price(80.0);
        let t2 = t0 + ChronoDuration::seconds(1800);
        assert!(engine.run_cycle_at(t2).await);
        assert!(!engine.has_open_position());

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.risk.trades_count, 1);
        assert!(snapshot.risk.cumulative_pnl < 0.0);
    }

    #[tokio::test]
    async fn test_cooldown_blocks_reentry_after_sale() {
        let market = ScriptedMarket::new(100.0);
        let mut cfg = BotConfig::default();
        cfg.trading.max_daily_loss = 1_000_000.0; // keep the kill switch out of the way
        cfg.trading.min_time_between_trades_secs = 0;
        let mut engine = engine_with(market.clone(), cfg);
        let t0 = t0();

        assert!(engine.run_cycle_at(t0).await);
        market.set_price(80.0);
        assert!(engine.run_cycle_at(t0 + ChronoDuration::seconds(900)).await);

        // The only universe symbol was just sold and is in cooldown
        let t2 = t0 + ChronoDuration::seconds(1800);
        assert!(!engine.run_cycle_at(t2).await);
        assert!(!engine.has_open_position());

        // Past the cooldown window it trades again
        let t3 = t0 + ChronoDuration::seconds(900 + 3700);
        assert!(engine.run_cycle_at(t3).await);
        assert!(engine.has_open_position());
    }

    #[tokio::test]
    async fn test_daily_loss_kill_switch_blocks_entries() {
        let market = ScriptedMarket::new(100.0);
        let mut cfg = BotConfig::default();
        cfg.trading.max_daily_loss = 50.0; // the scripted loss (~-190) trips it
        cfg.trading.cooldown_time_secs = 0;
        cfg.trading.min_time_between_trades_secs = 0;
        let mut engine = engine_with(market.clone(), cfg);
        let t0 = t0();

        assert!(engine.run_cycle_at(t0).await);
        market.set_price(80.0);
        assert!(engine.run_cycle_at(t0 + ChronoDuration::seconds(900)).await);

        // Loss exceeded the daily cap: the ranker is never consulted again today
        let calls_before = market.universe_calls.load(Ordering::SeqCst);
        assert!(!engine.run_cycle_at(t0 + ChronoDuration::seconds(1800)).await);
        assert_eq!(market.universe_calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_trade_spacing_respected_between_entries() {
        let market = ScriptedMarket::new(100.0);
        let mut cfg = BotConfig::default();
        cfg.trading.max_daily_loss = 1_000_000.0;
        cfg.trading.cooldown_time_secs = 0;
        cfg.trading.min_time_between_trades_secs = 3600;
        let mut engine = engine_with(market.clone(), cfg);
        let t0 = t0();

        assert!(engine.run_cycle_at(t0).await);
        market.set_price(80.0);
        assert!(engine.run_cycle_at(t0 + ChronoDuration::seconds(900)).await);

        // Too soon after the recorded trade
        assert!(!engine.run_cycle_at(t0 + ChronoDuration::seconds(1200)).await);

        // After the spacing window a new entry goes through
        assert!(engine.run_cycle_at(t0 + ChronoDuration::seconds(900 + 3700)).await);
    }
}
