//! Position lifecycle manager: entry sizing and execution, per-cycle
//! management (trailing stop + exit triggers) and P&L realization.
//!
//! The manager is stateless; the engine owns the single position slot and
//! interprets the outcome of each call. A failed sell leaves the position
//! untouched so exposure tracking is never silently dropped.

use crate::config::BotConfig;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use crate::market::{FillResult, MarketData, OrderGateway};
use crate::ranker::CandidateScore;
use crate::trader::position::{apply_trailing_stop, evaluate_exit, ExitTrigger, Position};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Realized result of a closed position.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub symbol: String,
    pub trigger: ExitTrigger,
    pub net_proceeds: f64,
    pub realized_pnl: f64,
}

/// What happened to the open position this cycle.
#[derive(Debug)]
pub enum ManageOutcome {
    /// No trigger fired; position carries over
    Held,
    /// Sold and realized
    Closed(TradeOutcome),
    /// Nothing left to sell even after the recorded-quantity fallback; the
    /// slot must be cleared to avoid a stuck position
    ForceReset,
}

pub struct PositionManager {
    market: Arc<dyn MarketData>,
    gateway: Arc<dyn OrderGateway>,
    cfg: Arc<BotConfig>,
}

impl PositionManager {
    pub fn new(
        market: Arc<dyn MarketData>,
        gateway: Arc<dyn OrderGateway>,
        cfg: Arc<BotConfig>,
    ) -> Self {
        Self {
            market,
            gateway,
            cfg,
        }
    }

    /// Open a position for the selected candidate. No state is mutated on
    /// rejection; the engine simply tries again next cycle.
    pub async fn open(&self, candidate: &CandidateScore, now: DateTime<Utc>) -> BotResult<Position> {
        let quote_balance = self.market.get_quote_balance().await;
        let portfolio_value = self.market.get_portfolio_value().await;
        let to_invest = (portfolio_value * self.cfg.trading.per_trade_fraction).min(quote_balance);

        if to_invest < self.cfg.trading.min_trade_notional {
            return Err(BotError::OrderRejected {
                symbol: candidate.symbol.clone(),
                reason: format!(
                    "investable {:.2} below minimum notional {:.2}",
                    to_invest, self.cfg.trading.min_trade_notional
                ),
            });
        }

        logger::info(
            LogTag::Trader,
            &format!("Buying {} with ~{:.2} {}", candidate.symbol, to_invest, self.quote()),
        );

        let fill = self
            .gateway
            .buy(&candidate.symbol, to_invest)
            .await
            .ok_or_else(|| BotError::OrderRejected {
                symbol: candidate.symbol.clone(),
                reason: "buy order not filled".to_string(),
            })?;

        if fill.qty <= 0.0 || fill.avg_price <= 0.0 {
            return Err(BotError::OrderRejected {
                symbol: candidate.symbol.clone(),
                reason: "buy fill has zero quantity or price".to_string(),
            });
        }

        let fees_quote = self.fees_in_quote(&fill).await;
        let entry_cost_with_fees = fill.gross_quote + fees_quote;

        let position = Position {
            symbol: candidate.symbol.clone(),
            entry_price: fill.avg_price,
            quantity: fill.qty,
            entry_cost_with_fees,
            open_time: now,
            stop_loss_pct: candidate.stop_loss_pct,
            take_profit_pct: candidate.take_profit_pct,
            highest_price_seen: fill.avg_price,
        };

        logger::success(
            LogTag::Trader,
            &format!(
                "Opened {} | qty {:.8} @ {:.6}, cost {:.2} (fees {:.4}) | SL {:.2}% TP {:.2}%",
                position.symbol,
                position.quantity,
                position.entry_price,
                position.entry_cost_with_fees,
                fees_quote,
                position.stop_loss_pct * 100.0,
                position.take_profit_pct * 100.0
            ),
        );

        Ok(position)
    }

    /// One management pass over the open position: trailing-stop upkeep, exit
    /// evaluation and, when a trigger fires, the sell itself.
    pub async fn manage(
        &self,
        position: &mut Position,
        now: DateTime<Utc>,
    ) -> BotResult<ManageOutcome> {
        let current_price = self
            .market
            .get_current_price(&position.symbol)
            .await
            .ok_or_else(|| {
                BotError::ConnectivityLost(format!("no price for {}", position.symbol))
            })?;

        if self.cfg.trading.use_trailing_stop {
            let moved =
                apply_trailing_stop(position, current_price, self.cfg.trading.trailing_stop_distance);
            if moved {
                logger::info(
                    LogTag::Trader,
                    &format!(
                        "Trailing stop lifted for {}: high {:.6}, stop now {:.6}",
                        position.symbol,
                        position.highest_price_seen,
                        position.stop_price()
                    ),
                );
            }
        }

        logger::debug(
            LogTag::Trader,
            &format!(
                "{} @ {:.6} ({:+.2}%) | stop {:.6} take {:.6}",
                position.symbol,
                current_price,
                position.unrealized_pnl_pct(current_price),
                position.stop_price(),
                position.take_profit_price()
            ),
        );

        let trigger = match evaluate_exit(position, current_price, now, &self.cfg.trading) {
            Some(t) => t,
            None => return Ok(ManageOutcome::Held),
        };

        logger::info(
            LogTag::Trader,
            &format!("Exit trigger {} for {}", trigger.as_str(), position.symbol),
        );
        self.close(position, trigger).await
    }

    async fn close(&self, position: &Position, trigger: ExitTrigger) -> BotResult<ManageOutcome> {
        // Live balance first; fall back to the recorded quantity when rounding
        // or dust drift reads zero.
        let mut quantity = self.gateway.get_base_balance(&position.symbol).await;
        if quantity <= 0.0 && position.quantity > 0.0 {
            logger::warning(
                LogTag::Trader,
                &format!(
                    "Live balance for {} reads zero, selling recorded quantity {:.8}",
                    position.symbol, position.quantity
                ),
            );
            quantity = position.quantity;
        }

        if quantity <= 0.0 {
            logger::error(
                LogTag::Trader,
                &format!("{} has no sellable quantity, clearing slot", position.symbol),
            );
            return Ok(ManageOutcome::ForceReset);
        }

        let fill = self
            .gateway
            .sell(&position.symbol, quantity)
            .await
            .ok_or_else(|| BotError::ExitExecutionFailure {
                symbol: position.symbol.clone(),
                reason: "sell order not filled".to_string(),
            })?;

        let fees_quote = self.fees_in_quote(&fill).await;
        let net_proceeds = fill.gross_quote - fees_quote;
        let realized_pnl = net_proceeds - position.entry_cost_with_fees;

        logger::success(
            LogTag::Trader,
            &format!(
                "Closed {} via {} | sold {:.8} @ {:.6}, net {:.2}, P&L {:+.2}",
                position.symbol,
                trigger.as_str(),
                fill.qty,
                fill.avg_price,
                net_proceeds,
                realized_pnl
            ),
        );

        Ok(ManageOutcome::Closed(TradeOutcome {
            symbol: position.symbol.clone(),
            trigger,
            net_proceeds,
            realized_pnl,
        }))
    }

    fn quote(&self) -> &str {
        &self.cfg.market.quote_asset
    }

    /// Convert a fill's commission into quote terms, looking up the fee
    /// asset's live price when needed.
    async fn fees_in_quote(&self, fill: &FillResult) -> f64 {
        let quote = self.quote();
        if fill.fee_asset == quote {
            return fill.fees;
        }

        let pair = format!("{}{}", fill.fee_asset, quote);
        let fee_asset_price = self.market.get_current_price(&pair).await;
        if fee_asset_price.is_none() {
            logger::warning(
                LogTag::Trader,
                &format!(
                    "No price for {}, estimating fees at {:.3}%",
                    pair,
                    self.cfg.market.fee_percent * 100.0
                ),
            );
        }
        fill.fees_in_quote(quote, fee_asset_price, self.cfg.market.fee_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PriceSeries;
    use crate::sentiment::verdict::{BuyRecommendation, SentimentLabel};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MockMarket {
        prices: HashMap<String, f64>,
        quote_balance: f64,
        portfolio_value: f64,
    }

    #[async_trait]
    impl MarketData for MockMarket {
        async fn list_symbols(&self) -> Vec<String> {
            Vec::new()
        }

        async fn get_history(&self, symbol: &str, _i: &str, _l: usize) -> PriceSeries {
            PriceSeries::new(symbol, "1h", Vec::new())
        }

        async fn get_current_price(&self, symbol: &str) -> Option<f64> {
            self.prices.get(symbol).copied()
        }

        async fn get_quote_balance(&self) -> f64 {
            self.quote_balance
        }

        async fn get_portfolio_value(&self) -> f64 {
            self.portfolio_value
        }
    }

    struct MockGateway {
        buy_fill: Option<FillResult>,
        sell_fill: Mutex<Option<Option<FillResult>>>,
        base_balance: f64,
    }

    #[async_trait]
    impl OrderGateway for MockGateway {
        async fn buy(&self, _symbol: &str, _quote_amount: f64) -> Option<FillResult> {
            self.buy_fill.clone()
        }

        async fn sell(&self, _symbol: &str, _qty: f64) -> Option<FillResult> {
            self.sell_fill.lock().await.take().flatten()
        }

        async fn get_base_balance(&self, _symbol: &str) -> f64 {
            self.base_balance
        }
    }

    fn fill(avg_price: f64, qty: f64, fees: f64, fee_asset: &str) -> FillResult {
        FillResult {
            avg_price,
            qty,
            gross_quote: avg_price * qty,
            fees,
            fee_asset: fee_asset.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn candidate() -> CandidateScore {
        CandidateScore {
            symbol: "BTCUSDT".to_string(),
            tech_score: 30.0,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            sentiment_score: 60,
            sentiment_label: SentimentLabel::Positive,
            buy_recommendation: BuyRecommendation::Yes,
            final_score: 100.0,
        }
    }

    fn manager(market: MockMarket, gateway: MockGateway) -> PositionManager {
        PositionManager::new(
            Arc::new(market),
            Arc::new(gateway),
            Arc::new(BotConfig::default()),
        )
    }

    fn open_position(entry: f64) -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            entry_price: entry,
            quantity: 2.0,
            entry_cost_with_fees: entry * 2.0 + 0.2,
            open_time: Utc::now(),
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            highest_price_seen: entry,
        }
    }

    #[tokio::test]
    async fn test_entry_below_min_notional_rejected() {
        let market = MockMarket {
            prices: HashMap::new(),
            quote_balance: 5.0,
            portfolio_value: 5.0,
        };
        let gateway = MockGateway {
            buy_fill: Some(fill(100.0, 0.05, 0.0, "USDT")),
            sell_fill: Mutex::new(None),
            base_balance: 0.0,
        };

        let result = manager(market, gateway).open(&candidate(), Utc::now()).await;
        assert!(matches!(result, Err(BotError::OrderRejected { .. })));
    }

    #[tokio::test]
    async fn test_entry_records_cost_with_converted_fees() {
        let mut prices = HashMap::new();
        prices.insert("BNBUSDT".to_string(), 500.0);
        let market = MockMarket {
            prices,
            quote_balance: 1000.0,
            portfolio_value: 1000.0,
        };
        // Fees charged in BNB: 0.01 BNB = 5 USDT at the mock price
        let gateway = MockGateway {
            buy_fill: Some(fill(100.0, 9.5, 0.01, "BNB")),
            sell_fill: Mutex::new(None),
            base_balance: 0.0,
        };

        let position = manager(market, gateway)
            .open(&candidate(), Utc::now())
            .await
            .unwrap();
        assert!((position.entry_cost_with_fees - (950.0 + 5.0)).abs() < 1e-9);
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.highest_price_seen, 100.0);
    }

    #[tokio::test]
    async fn test_stop_loss_close_realizes_pnl() {
        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), 94.0);
        let market = MockMarket {
            prices,
            quote_balance: 0.0,
            portfolio_value: 0.0,
        };
        let gateway = MockGateway {
            buy_fill: None,
            sell_fill: Mutex::new(Some(Some(fill(94.0, 2.0, 0.188, "USDT")))),
            base_balance: 2.0,
        };

        let mgr = manager(market, gateway);
        let mut position = open_position(100.0);

        match mgr.manage(&mut position, Utc::now()).await.unwrap() {
            ManageOutcome::Closed(outcome) => {
                assert_eq!(outcome.trigger, ExitTrigger::StopLoss);
                // net = 188 - 0.188, cost = 200.2
                assert!((outcome.net_proceeds - 187.812).abs() < 1e-9);
                assert!((outcome.realized_pnl - (187.812 - 200.2)).abs() < 1e-9);
            }
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sell_failure_keeps_position() {
        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), 90.0);
        let market = MockMarket {
            prices,
            quote_balance: 0.0,
            portfolio_value: 0.0,
        };
        let gateway = MockGateway {
            buy_fill: None,
            sell_fill: Mutex::new(Some(None)),
            base_balance: 2.0,
        };

        let mgr = manager(market, gateway);
        let mut position = open_position(100.0);
        let before = position.clone();

        let result = mgr.manage(&mut position, Utc::now()).await;
        assert!(matches!(result, Err(BotError::ExitExecutionFailure { .. })));
        assert_eq!(position.quantity, before.quantity);
        assert_eq!(position.entry_cost_with_fees, before.entry_cost_with_fees);
    }

    #[tokio::test]
    async fn test_zero_balance_falls_back_to_recorded_quantity() {
        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), 90.0);
        let market = MockMarket {
            prices,
            quote_balance: 0.0,
            portfolio_value: 0.0,
        };
        let gateway = MockGateway {
            buy_fill: None,
            sell_fill: Mutex::new(Some(Some(fill(90.0, 2.0, 0.18, "USDT")))),
            base_balance: 0.0,
        };

        let mgr = manager(market, gateway);
        let mut position = open_position(100.0);
        let outcome = mgr.manage(&mut position, Utc::now()).await.unwrap();
        assert!(matches!(outcome, ManageOutcome::Closed(_)));
    }

    #[tokio::test]
    async fn test_zero_quantity_after_fallback_force_resets() {
        let mut prices = HashMap::new();
        prices.insert("BTCUSDT".to_string(), 90.0);
        let market = MockMarket {
            prices,
            quote_balance: 0.0,
            portfolio_value: 0.0,
        };
        let gateway = MockGateway {
            buy_fill: None,
            sell_fill: Mutex::new(None),
            base_balance: 0.0,
        };

        let mgr = manager(market, gateway);
        let mut position = open_position(100.0);
        position.quantity = 0.0;

        let outcome = mgr.manage(&mut position, Utc::now()).await.unwrap();
        assert!(matches!(outcome, ManageOutcome::ForceReset));
    }

    #[tokio::test]
    async fn test_missing_price_degrades_without_selling() {
        let market = MockMarket {
            prices: HashMap::new(),
            quote_balance: 0.0,
            portfolio_value: 0.0,
        };
        let gateway = MockGateway {
            buy_fill: None,
            sell_fill: Mutex::new(None),
            base_balance: 2.0,
        };

        let mgr = manager(market, gateway);
        let mut position = open_position(100.0);
        let result = mgr.manage(&mut position, Utc::now()).await;
        assert!(matches!(result, Err(BotError::ConnectivityLost(_))));
    }
}
