//! Technical indicator library.
//!
//! Stateless functions over an ordered OHLCV series. Every function declares a
//! minimum series length and returns `None` below it instead of panicking, so
//! a thin history excludes a symbol from the cycle rather than killing it.

use crate::market::PriceSeries;

/// Bollinger band snapshot for the latest bar.
#[derive(Debug, Clone, Copy)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Where the latest close sits between the bands: 0 at the lower band,
    /// 1 at the upper. Not clamped; prices outside the bands fall outside [0, 1].
    pub position: f64,
}

/// MACD snapshot for the latest bar.
#[derive(Debug, Clone, Copy)]
pub struct Macd {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Relative Strength Index over `period` bars. Rolling mean of gains against
/// rolling mean of losses; needs `period + 1` bars for the first delta.
pub fn rsi(series: &PriceSeries, period: usize) -> Option<f64> {
    let closes = series.closes();
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len() - period..];

    let avg_gain: f64 = recent.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let avg_loss: f64 = -recent.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        // All-gain window saturates; a flat window reads neutral.
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Simple moving average of the closing price.
pub fn sma(series: &PriceSeries, period: usize) -> Option<f64> {
    let closes = series.closes();
    if period == 0 || closes.len() < period {
        return None;
    }
    Some(closes[closes.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Exponential moving average, smoothing `2 / (period + 1)`, seeded by the
/// first value.
pub fn ema(series: &PriceSeries, period: usize) -> Option<f64> {
    ema_over(&series.closes(), period)
}

fn ema_over(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).and_then(|s| s.last().copied())
}

fn ema_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }
    Some(out)
}

/// MACD line, signal line and histogram for the latest bar.
pub fn macd(series: &PriceSeries, fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    let closes = series.closes();
    if closes.len() < slow + signal {
        return None;
    }

    let fast_series = ema_series(&closes, fast)?;
    let slow_series = ema_series(&closes, slow)?;
    let macd_values: Vec<f64> = fast_series
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_series = ema_series(&macd_values, signal)?;
    let macd_line = *macd_values.last()?;
    let signal_line = *signal_series.last()?;

    Some(Macd {
        macd_line,
        signal_line,
        histogram: macd_line - signal_line,
    })
}

/// Average True Range: rolling mean of the true range over `period` bars.
pub fn atr(series: &PriceSeries, period: usize) -> Option<f64> {
    let candles = &series.candles;
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let bar = w[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect();

    let recent = &true_ranges[true_ranges.len() - period..];
    Some(recent.iter().sum::<f64>() / period as f64)
}

/// Bollinger bands: SMA ± `k` standard deviations, plus the relative position
/// of the latest close. Zero-width bands read as the midpoint.
pub fn bollinger(series: &PriceSeries, period: usize, k: f64) -> Option<BollingerBands> {
    let closes = series.closes();
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let stddev = sample_stddev(window)?;

    let upper = middle + k * stddev;
    let lower = middle - k * stddev;
    let price = *closes.last()?;

    let position = if upper > lower {
        (price - lower) / (upper - lower)
    } else {
        0.5
    };

    Some(BollingerBands {
        upper,
        middle,
        lower,
        position,
    })
}

/// Realized volatility: standard deviation of percentage returns over the
/// trailing `window`.
pub fn volatility(series: &PriceSeries, window: usize) -> Option<f64> {
    let closes = series.closes();
    if window < 2 || closes.len() < window + 1 {
        return None;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < window {
        return None;
    }

    sample_stddev(&returns[returns.len() - window..])
}

/// Mean volume over a recent `short` window relative to a `long` baseline.
pub fn volume_ratio(series: &PriceSeries, short: usize, long: usize) -> Option<f64> {
    let candles = &series.candles;
    if short == 0 || long <= short || candles.len() < long {
        return None;
    }

    let mean = |n: usize| {
        candles[candles.len() - n..]
            .iter()
            .map(|c| c.volume)
            .sum::<f64>()
            / n as f64
    };

    let baseline = mean(long);
    if baseline <= 0.0 {
        return None;
    }
    Some(mean(short) / baseline)
}

fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() as f64 - 1.0);
    Some(variance.sqrt())
}
