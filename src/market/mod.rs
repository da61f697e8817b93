//! Market data and order execution interfaces.
//!
//! The decision engine only sees these traits; live trading wires them to the
//! Binance REST client and the paper gateway.

pub mod binance;
pub mod paper;
pub mod types;

pub use types::{Candle, FillResult, PriceSeries};

use async_trait::async_trait;

/// Price history and account snapshot provider.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Eligible symbol universe, already liquidity-filtered.
    async fn list_symbols(&self) -> Vec<String>;

    /// OHLCV history. May return an empty series on provider failure.
    async fn get_history(&self, symbol: &str, interval: &str, lookback: usize) -> PriceSeries;

    async fn get_current_price(&self, symbol: &str) -> Option<f64>;

    /// Free quote-asset balance.
    async fn get_quote_balance(&self) -> f64;

    /// Total account value in quote asset terms.
    async fn get_portfolio_value(&self) -> f64;
}

/// Market order execution. Either call may fail lot-size or notional
/// constraints and return `None`; no state is mutated in that case.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn buy(&self, symbol: &str, quote_amount: f64) -> Option<FillResult>;

    async fn sell(&self, symbol: &str, qty: f64) -> Option<FillResult>;

    /// Free balance of the base asset backing `symbol`.
    async fn get_base_balance(&self, symbol: &str) -> f64;
}
