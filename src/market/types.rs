use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single OHLCV bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered OHLCV history for one symbol and interval. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub interval: String,
    pub candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Latest close, if any bars exist.
    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// Executed order summary, aggregated over fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillResult {
    /// Volume-weighted average fill price
    pub avg_price: f64,
    /// Total base-asset quantity filled
    pub qty: f64,
    /// Gross order value in quote asset terms
    pub gross_quote: f64,
    /// Total commission, in `fee_asset` units
    pub fees: f64,
    /// Asset the commission was charged in
    pub fee_asset: String,
    pub timestamp: DateTime<Utc>,
}

impl FillResult {
    /// Commission in quote terms, converting through `fee_asset_price` when
    /// the fee was charged in another asset. Falls back to the estimated fee
    /// fraction of gross value when no conversion price is available.
    pub fn fees_in_quote(
        &self,
        quote_asset: &str,
        fee_asset_price: Option<f64>,
        estimated_fee_percent: f64,
    ) -> f64 {
        if self.fee_asset == quote_asset {
            return self.fees;
        }
        match fee_asset_price {
            Some(price) if price > 0.0 => self.fees * price,
            _ => self.gross_quote * estimated_fee_percent,
        }
    }
}
