//! Paper broker: simulated fills against live prices.
//!
//! Wraps a data-only provider and layers a local balance ledger on top, so
//! the engine trades full size against real market data without touching the
//! signed order endpoints. Fees are charged on the quote side at the
//! configured fraction.

use crate::logger::{self, LogTag};
use crate::market::types::{FillResult, PriceSeries};
use crate::market::{MarketData, OrderGateway};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Ledger {
    quote: f64,
    base: HashMap<String, f64>,
}

pub struct PaperBroker {
    inner: Arc<dyn MarketData>,
    quote_asset: String,
    fee_percent: f64,
    ledger: Mutex<Ledger>,
}

impl PaperBroker {
    pub fn new(
        inner: Arc<dyn MarketData>,
        quote_asset: impl Into<String>,
        fee_percent: f64,
        starting_quote: f64,
    ) -> Self {
        Self {
            inner,
            quote_asset: quote_asset.into(),
            fee_percent,
            ledger: Mutex::new(Ledger {
                quote: starting_quote,
                base: HashMap::new(),
            }),
        }
    }

    fn base_of<'a>(&self, symbol: &'a str) -> &'a str {
        symbol.strip_suffix(self.quote_asset.as_str()).unwrap_or(symbol)
    }
}

#[async_trait]
impl MarketData for PaperBroker {
    async fn list_symbols(&self) -> Vec<String> {
        self.inner.list_symbols().await
    }

    async fn get_history(&self, symbol: &str, interval: &str, lookback: usize) -> PriceSeries {
        self.inner.get_history(symbol, interval, lookback).await
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        self.inner.get_current_price(symbol).await
    }

    async fn get_quote_balance(&self) -> f64 {
        self.ledger.lock().await.quote
    }

    async fn get_portfolio_value(&self) -> f64 {
        let (quote, holdings) = {
            let ledger = self.ledger.lock().await;
            (ledger.quote, ledger.base.clone())
        };

        let mut total = quote;
        for (base, qty) in holdings {
            if qty <= 0.0 {
                continue;
            }
            let symbol = format!("{}{}", base, self.quote_asset);
            match self.inner.get_current_price(&symbol).await {
                Some(price) => total += qty * price,
                None => logger::debug(
                    LogTag::Market,
                    &format!("No price for {}, holding excluded from valuation", symbol),
                ),
            }
        }
        total
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn buy(&self, symbol: &str, quote_amount: f64) -> Option<FillResult> {
        if quote_amount <= 0.0 {
            return None;
        }
        let price = self.inner.get_current_price(symbol).await?;

        let mut ledger = self.ledger.lock().await;
        if ledger.quote < quote_amount {
            logger::warning(
                LogTag::Market,
                &format!(
                    "Paper buy rejected: balance {:.2} below order {:.2}",
                    ledger.quote, quote_amount
                ),
            );
            return None;
        }

        let fees = quote_amount * self.fee_percent;
        let gross = quote_amount - fees;
        let qty = gross / price;

        ledger.quote -= quote_amount;
        *ledger.base.entry(self.base_of(symbol).to_string()).or_default() += qty;

        Some(FillResult {
            avg_price: price,
            qty,
            gross_quote: gross,
            fees,
            fee_asset: self.quote_asset.clone(),
            timestamp: Utc::now(),
        })
    }

    async fn sell(&self, symbol: &str, qty: f64) -> Option<FillResult> {
        if qty <= 0.0 {
            return None;
        }
        let price = self.inner.get_current_price(symbol).await?;
        let base = self.base_of(symbol).to_string();

        let mut ledger = self.ledger.lock().await;
        let held = ledger.base.get(&base).copied().unwrap_or(0.0);
        // Cap at the held amount; honor the caller's recorded quantity when
        // the ledger reads zero from rounding drift
        let qty = if held > 0.0 { qty.min(held) } else { qty };

        let gross = qty * price;
        let fees = gross * self.fee_percent;

        *ledger.base.entry(base).or_default() = (held - qty).max(0.0);
        ledger.quote += gross - fees;

        Some(FillResult {
            avg_price: price,
            qty,
            gross_quote: gross,
            fees,
            fee_asset: self.quote_asset.clone(),
            timestamp: Utc::now(),
        })
    }

    async fn get_base_balance(&self, symbol: &str) -> f64 {
        let base = self.base_of(symbol);
        self.ledger
            .lock()
            .await
            .base
            .get(base)
            .copied()
            .unwrap_or(0.0)
    }
}
