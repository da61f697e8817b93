//! Technical scorer: turns one symbol's price history into a preliminary
//! score and adaptive stop-loss / take-profit parameters.

use crate::config::StrategyConfig;
use crate::indicators;
use crate::logger::{self, LogTag};
use crate::market::PriceSeries;

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const ATR_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_K: f64 = 2.0;
const SMA_FAST_PERIOD: usize = 50;
const SMA_SLOW_PERIOD: usize = 200;
const VOLUME_SHORT_WINDOW: usize = 6;
const VOLUME_LONG_WINDOW: usize = 24;

/// Derived features for one symbol at one evaluation time. Recomputed every
/// cycle, never persisted.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    pub rsi: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub atr: Option<f64>,
    pub volatility: Option<f64>,
    pub bollinger_position: Option<f64>,
    pub volume_ratio: Option<f64>,
}

/// Scorer output for one symbol.
#[derive(Debug, Clone)]
pub struct TechScore {
    pub symbol: String,
    pub tech_score: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub indicators: IndicatorSet,
}

/// Score a symbol from its price history.
///
/// Returns `None` when the symbol is excluded from this cycle: RSI at or above
/// the momentum ceiling, or RSI/volatility unavailable from the history.
/// Optional indicators (long SMAs, MACD, Bollinger, volume) contribute zero
/// when the history is too short for them.
pub fn evaluate(series: &PriceSeries, cfg: &StrategyConfig) -> Option<TechScore> {
    let current_price = series.last_close()?;
    if current_price <= 0.0 {
        return None;
    }

    let rsi = indicators::rsi(series, cfg.rsi_period)?;
    if rsi >= cfg.rsi_buy_threshold {
        logger::debug(
            LogTag::Scorer,
            &format!(
                "{}: RSI {:.2} at or above ceiling {:.2}, skipped",
                series.symbol, rsi, cfg.rsi_buy_threshold
            ),
        );
        return None;
    }

    let volatility = indicators::volatility(series, cfg.volatility_window)?;

    let sma_50 = indicators::sma(series, SMA_FAST_PERIOD);
    let sma_200 = indicators::sma(series, SMA_SLOW_PERIOD);
    let macd = indicators::macd(series, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let atr = indicators::atr(series, ATR_PERIOD);
    let bollinger = indicators::bollinger(series, BOLLINGER_PERIOD, BOLLINGER_K);
    let volume_ratio = indicators::volume_ratio(series, VOLUME_SHORT_WINDOW, VOLUME_LONG_WINDOW);

    let mut score = rsi_distance_bonus(rsi, cfg);
    score += volatility_contribution(volatility);
    score += trend_bonus(sma_50, sma_200, macd.as_ref());
    score += volume_contribution(volume_ratio);
    score += bollinger_bonus(bollinger.as_ref().map(|b| b.position));

    let stop_loss_pct = stop_loss_from_atr(atr, current_price, cfg);
    let take_profit_pct = (stop_loss_pct * cfg.reward_ratio).max(cfg.take_profit_min_pct);

    Some(TechScore {
        symbol: series.symbol.clone(),
        tech_score: score,
        stop_loss_pct,
        take_profit_pct,
        indicators: IndicatorSet {
            rsi: Some(rsi),
            sma_50,
            sma_200,
            macd_line: macd.as_ref().map(|m| m.macd_line),
            macd_signal: macd.as_ref().map(|m| m.signal_line),
            atr,
            volatility: Some(volatility),
            bollinger_position: bollinger.map(|b| b.position),
            volume_ratio,
        },
    })
}

/// Distance below the RSI ceiling; full weight in oversold territory, half
/// weight in the neutral band below the buy threshold.
fn rsi_distance_bonus(rsi: f64, cfg: &StrategyConfig) -> f64 {
    let distance = cfg.rsi_buy_threshold - rsi;
    if rsi < cfg.rsi_oversold {
        distance
    } else {
        distance * 0.5
    }
}

/// Non-linear volatility tiers. The moderate band is where a short swing trade
/// has room to move without being pure noise; very low and very high
/// volatility both earn less.
fn volatility_contribution(volatility: f64) -> f64 {
    if volatility < 0.01 {
        volatility * 500.0
    } else if volatility <= 0.05 {
        volatility * 1000.0
    } else {
        (50.0 - (volatility - 0.05) * 400.0).max(0.0)
    }
}

fn trend_bonus(
    sma_50: Option<f64>,
    sma_200: Option<f64>,
    macd: Option<&indicators::Macd>,
) -> f64 {
    let mut bonus = 0.0;

    if let (Some(fast), Some(slow)) = (sma_50, sma_200) {
        bonus += if fast > slow { 10.0 } else { -10.0 };
    }

    if let Some(m) = macd {
        if m.macd_line > m.signal_line && m.histogram > 0.0 {
            bonus += 5.0;
        } else if m.macd_line < m.signal_line {
            bonus -= 5.0;
        }
    }

    bonus
}

fn volume_contribution(volume_ratio: Option<f64>) -> f64 {
    match volume_ratio {
        Some(ratio) => (ratio - 1.0).clamp(-1.0, 1.5) * 10.0,
        None => 0.0,
    }
}

/// Proximity to the lower Bollinger band, up to +10 at the band itself.
fn bollinger_bonus(position: Option<f64>) -> f64 {
    match position {
        Some(p) => (1.0 - p).clamp(0.0, 1.0) * 10.0,
        None => 0.0,
    }
}

/// ATR-scaled stop loss clamped into the configured band, with a fixed
/// default when ATR is unavailable or non-positive.
fn stop_loss_from_atr(atr: Option<f64>, current_price: f64, cfg: &StrategyConfig) -> f64 {
    match atr {
        Some(value) if value > 0.0 => (value * cfg.atr_multiplier / current_price)
            .clamp(cfg.stop_loss_min_pct, cfg.stop_loss_max_pct),
        _ => cfg.stop_loss_default_pct,
    }
}
