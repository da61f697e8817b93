//! Binance public REST market data.
//!
//! Only unauthenticated endpoints are used: the symbol universe from the 24h
//! ticker, klines for history and the spot ticker for current prices. Account
//! balances are not served here; the paper broker layers those on top. Every
//! request failure degrades to an empty result so a provider outage skips the
//! affected operation instead of killing the cycle.

use crate::config::MarketConfig;
use crate::logger::{self, LogTag};
use crate::market::types::{Candle, PriceSeries};
use crate::market::MarketData;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Fallback universe when the exchange is unreachable.
const DEFAULT_SYMBOLS: &[&str] = &[
    "BTC", "ETH", "BNB", "SOL", "XRP", "ADA", "DOGE", "DOT", "AVAX", "LINK",
];

pub struct BinanceMarketData {
    client: reqwest::Client,
    base_url: String,
    quote_asset: String,
    min_volume_filter: f64,
}

#[derive(Debug, Deserialize)]
struct Ticker24h {
    symbol: String,
    #[serde(rename = "quoteVolume", default)]
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Leveraged tokens and synthetic pairs are not tradable candidates.
fn is_eligible_symbol(symbol: &str, quote: &str) -> bool {
    symbol.ends_with(quote)
        && !symbol.ends_with(&format!("UP{}", quote))
        && !symbol.ends_with(&format!("DOWN{}", quote))
        && !symbol.contains("BULL")
        && !symbol.contains("BEAR")
}

/// Parse one kline row: `[open_time, open, high, low, close, volume, ...]`
/// with numeric fields as strings.
fn parse_kline_row(row: &Value) -> Option<Candle> {
    let field = |idx: usize| row.get(idx)?.as_str()?.parse::<f64>().ok();
    Some(Candle {
        open_time: row.get(0)?.as_i64()?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

impl BinanceMarketData {
    pub fn new(cfg: &MarketConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: cfg.rest_base_url.trim_end_matches('/').to_string(),
            quote_asset: cfg.quote_asset.clone(),
            min_volume_filter: cfg.min_volume_filter,
        }
    }

    async fn ping(&self) -> bool {
        let url = format!("{}/api/v3/ping", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }

    /// One reconnect attempt before giving up on the exchange this cycle.
    pub async fn ensure_connection(&self) -> bool {
        if self.ping().await {
            return true;
        }
        logger::warning(LogTag::Market, "Exchange unreachable, retrying once");
        self.ping().await
    }
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn list_symbols(&self) -> Vec<String> {
        if !self.ensure_connection().await {
            logger::warning(LogTag::Market, "Using default symbol universe");
            return DEFAULT_SYMBOLS
                .iter()
                .map(|coin| format!("{}{}", coin, self.quote_asset))
                .collect();
        }

        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let tickers: Vec<Ticker24h> = match self.client.get(&url).send().await {
            Ok(response) => match response.json().await {
                Ok(t) => t,
                Err(e) => {
                    logger::error(LogTag::Market, &format!("Ticker parse failed: {}", e));
                    return Vec::new();
                }
            },
            Err(e) => {
                logger::error(LogTag::Market, &format!("Ticker request failed: {}", e));
                return Vec::new();
            }
        };

        let mut eligible: Vec<(String, f64)> = tickers
            .into_iter()
            .filter(|t| is_eligible_symbol(&t.symbol, &self.quote_asset))
            .filter_map(|t| {
                let volume = t.quote_volume.parse::<f64>().ok()?;
                (volume > self.min_volume_filter).then_some((t.symbol, volume))
            })
            .collect();

        // Most liquid first; the ranker caps how many get analyzed
        eligible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        logger::info(
            LogTag::Market,
            &format!(
                "{} symbols above {:.0} {} 24h volume",
                eligible.len(),
                self.min_volume_filter,
                self.quote_asset
            ),
        );
        eligible.into_iter().map(|(symbol, _)| symbol).collect()
    }

    async fn get_history(&self, symbol: &str, interval: &str, lookback: usize) -> PriceSeries {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, lookback
        );

        let rows: Vec<Value> = match self.client.get(&url).send().await {
            Ok(response) => match response.json().await {
                Ok(r) => r,
                Err(e) => {
                    logger::debug(
                        LogTag::Market,
                        &format!("Klines parse failed for {}: {}", symbol, e),
                    );
                    return PriceSeries::new(symbol, interval, Vec::new());
                }
            },
            Err(e) => {
                logger::debug(
                    LogTag::Market,
                    &format!("Klines request failed for {}: {}", symbol, e),
                );
                return PriceSeries::new(symbol, interval, Vec::new());
            }
        };

        let candles: Vec<Candle> = rows.iter().filter_map(parse_kline_row).collect();
        PriceSeries::new(symbol, interval, candles)
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let ticker: TickerPrice = self.client.get(&url).send().await.ok()?.json().await.ok()?;
        ticker.price.parse::<f64>().ok().filter(|p| *p > 0.0)
    }

    // Account endpoints require signed requests; balances live in the broker
    // layer on top of this provider.
    async fn get_quote_balance(&self) -> f64 {
        0.0
    }

    async fn get_portfolio_value(&self) -> f64 {
        0.0
    }
}
