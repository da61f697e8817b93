use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Main bot configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between decision cycles
    pub cycle_interval_secs: u64,

    /// State snapshot path, written after every acted-on cycle
    pub state_file: String,

    pub market: MarketConfig,
    pub trading: TradingConfig,
    pub strategy: StrategyConfig,
    pub sentiment: SentimentConfig,
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub rest_base_url: String,
    pub quote_asset: String,
    /// Minimum 24h quote volume for a symbol to enter the universe
    pub min_volume_filter: f64,
    pub kline_interval: String,
    /// Number of bars fetched per history request
    pub lookback_bars: usize,
    pub max_symbols_to_analyze: usize,
    /// Estimated round-trip fee fraction, used when fills omit fee detail
    pub fee_percent: f64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Fraction of portfolio value committed per trade
    pub per_trade_fraction: f64,
    /// Minimum order value in quote asset terms
    pub min_trade_notional: f64,
    pub max_trades_per_day: u32,
    pub min_time_between_trades_secs: i64,
    /// Daily realized-loss kill switch, in quote asset terms
    pub max_daily_loss: f64,
    /// Re-entry cooldown after selling a symbol
    pub cooldown_time_secs: i64,
    /// Soft timeout: exit after this long only if in profit
    pub max_hold_time_secs: i64,
    /// Hard timeout: exit unconditionally after this long
    pub force_sell_time_secs: i64,
    pub use_trailing_stop: bool,
    /// Distance below the highest seen price for the trailing stop
    pub trailing_stop_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub rsi_period: usize,
    /// Symbols at or above this RSI are not considered
    pub rsi_buy_threshold: f64,
    /// Below this RSI the distance bonus applies at full weight
    pub rsi_oversold: f64,
    pub volatility_window: usize,
    pub stop_loss_min_pct: f64,
    pub stop_loss_max_pct: f64,
    /// Used when ATR is unavailable or non-positive
    pub stop_loss_default_pct: f64,
    pub atr_multiplier: f64,
    /// Minimum take-profit as a multiple of the stop-loss
    pub reward_ratio: f64,
    /// Absolute take-profit floor, covers round-trip fees
    pub take_profit_min_pct: f64,
    /// Candidates forwarded to sentiment analysis
    pub shortlist_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub primary_url: String,
    pub primary_model: String,
    pub primary_api_key: String,
    pub fallback_url: String,
    pub fallback_model: String,
    pub fallback_api_key: String,
    pub use_fallback_oracle: bool,
    pub cache_ttl_secs: i64,
    /// Attempts against the primary oracle before falling back
    pub retries: u32,
    pub request_timeout_secs: u64,
    pub liveness_timeout_secs: u64,
    /// Bounded concurrency for the sentiment fan-out
    pub workers: usize,
    pub prompt_max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub news_api_key: String,
    pub news_page_size: usize,
    pub reddit_limit: usize,
    pub request_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 900,
            state_file: "bot_state.json".to_string(),
            market: MarketConfig::default(),
            trading: TradingConfig::default(),
            strategy: StrategyConfig::default(),
            sentiment: SentimentConfig::default(),
            collector: CollectorConfig::default(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            rest_base_url: "https://api.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            min_volume_filter: 1_000_000.0,
            kline_interval: "1h".to_string(),
            lookback_bars: 72,
            max_symbols_to_analyze: 20,
            fee_percent: 0.001,
            request_timeout_secs: 10,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            per_trade_fraction: 0.95,
            min_trade_notional: 10.0,
            max_trades_per_day: 10,
            min_time_between_trades_secs: 900,
            max_daily_loss: 50.0,
            cooldown_time_secs: 3600,
            max_hold_time_secs: 12 * 3600,
            force_sell_time_secs: 24 * 3600,
            use_trailing_stop: true,
            trailing_stop_distance: 0.04,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_buy_threshold: 50.0,
            rsi_oversold: 30.0,
            volatility_window: 24,
            stop_loss_min_pct: 0.02,
            stop_loss_max_pct: 0.10,
            stop_loss_default_pct: 0.05,
            atr_multiplier: 2.0,
            reward_ratio: 2.0,
            take_profit_min_pct: 0.01,
            shortlist_size: 5,
        }
    }
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://localhost:8000".to_string(),
            primary_model: "local-llm".to_string(),
            primary_api_key: String::new(),
            fallback_url: "https://api.openai.com".to_string(),
            fallback_model: "gpt-3.5-turbo".to_string(),
            fallback_api_key: String::new(),
            use_fallback_oracle: false,
            cache_ttl_secs: 3600,
            retries: 3,
            request_timeout_secs: 30,
            liveness_timeout_secs: 10,
            workers: 5,
            prompt_max_chars: 4000,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            news_api_key: String::new(),
            news_page_size: 5,
            reddit_limit: 20,
            request_timeout_secs: 10,
        }
    }
}

impl BotConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: BotConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval_secs == 0 {
            return Err(anyhow!("cycle_interval_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.trading.per_trade_fraction) {
            return Err(anyhow!("per_trade_fraction must be within [0, 1]"));
        }
        if self.trading.min_trade_notional <= 0.0 {
            return Err(anyhow!("min_trade_notional must be positive"));
        }
        if self.strategy.stop_loss_min_pct > self.strategy.stop_loss_max_pct {
            return Err(anyhow!("stop_loss_min_pct must not exceed stop_loss_max_pct"));
        }
        if self.strategy.reward_ratio <= 0.0 {
            return Err(anyhow!("reward_ratio must be positive"));
        }
        if !(0.0..1.0).contains(&self.trading.trailing_stop_distance) {
            return Err(anyhow!("trailing_stop_distance must be within [0, 1)"));
        }
        if self.trading.max_hold_time_secs > self.trading.force_sell_time_secs {
            return Err(anyhow!(
                "max_hold_time_secs must not exceed force_sell_time_secs"
            ));
        }
        if self.sentiment.workers == 0 {
            return Err(anyhow!("sentiment.workers must be positive"));
        }
        Ok(())
    }
}
