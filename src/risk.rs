//! Risk governor: daily loss kill switch, trades-per-day cap and minimum
//! spacing between trades.

use crate::config::TradingConfig;
use crate::logger::{self, LogTag};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily trading counters. `cumulative_pnl` and `trades_count` reset at the
/// UTC day boundary; `last_trade_time` survives the rollover so trade spacing
/// holds across midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRiskState {
    pub date: NaiveDate,
    pub cumulative_pnl: f64,
    pub trades_count: u32,
    pub last_trade_time: Option<DateTime<Utc>>,
}

impl DailyRiskState {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            cumulative_pnl: 0.0,
            trades_count: 0,
            last_trade_time: None,
        }
    }
}

pub struct RiskGovernor {
    state: DailyRiskState,
    max_trades_per_day: u32,
    min_time_between_trades: Duration,
    max_daily_loss: f64,
}

impl RiskGovernor {
    pub fn new(cfg: &TradingConfig, now: DateTime<Utc>) -> Self {
        Self {
            state: DailyRiskState::new(now.date_naive()),
            max_trades_per_day: cfg.max_trades_per_day,
            min_time_between_trades: Duration::seconds(cfg.min_time_between_trades_secs),
            max_daily_loss: cfg.max_daily_loss,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.state.date {
            logger::info(LogTag::Risk, "UTC day rolled over, daily counters reset");
            let last_trade_time = self.state.last_trade_time;
            self.state = DailyRiskState::new(today);
            self.state.last_trade_time = last_trade_time;
        }
    }

    /// Frequency gate: trade count below the daily cap and enough time since
    /// the last trade.
    pub fn can_open_new_trade(&mut self, now: DateTime<Utc>) -> bool {
        self.roll(now);

        if self.state.trades_count >= self.max_trades_per_day {
            logger::warning(
                LogTag::Risk,
                &format!(
                    "Daily trade cap reached ({}/{})",
                    self.state.trades_count, self.max_trades_per_day
                ),
            );
            return false;
        }

        if let Some(last) = self.state.last_trade_time {
            if now - last < self.min_time_between_trades {
                logger::debug(LogTag::Risk, "Too soon since the last trade");
                return false;
            }
        }

        true
    }

    /// Daily-loss kill switch. Blocks new entries only; an open position
    /// keeps being managed to its exit.
    pub fn daily_loss_reached(&mut self, now: DateTime<Utc>) -> bool {
        self.roll(now);
        if self.state.cumulative_pnl <= -self.max_daily_loss {
            logger::warning(
                LogTag::Risk,
                &format!(
                    "Daily loss limit hit ({:.2}), entries paused until UTC midnight",
                    self.state.cumulative_pnl
                ),
            );
            return true;
        }
        false
    }

    /// Register a realized exit.
    pub fn record_trade(&mut self, realized_pnl: f64, now: DateTime<Utc>) {
        self.roll(now);
        self.state.trades_count += 1;
        self.state.last_trade_time = Some(now);
        self.state.cumulative_pnl += realized_pnl;
        logger::info(
            LogTag::Risk,
            &format!(
                "Trade #{} today, realized {:+.2}, day total {:+.2}",
                self.state.trades_count, realized_pnl, self.state.cumulative_pnl
            ),
        );
    }

    /// Current counters, for external persistence.
    pub fn snapshot(&self) -> DailyRiskState {
        self.state.clone()
    }
}
