//! Position state and exit-trigger evaluation.
//!
//! Pure functions over the position struct; the lifecycle manager owns the
//! side effects. Trigger precedence is fixed: hard timeout, then soft timeout,
//! then stop-loss, then take-profit; first match wins.

use crate::config::TradingConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The single open position. Created once on entry; `stop_loss_pct` and
/// `highest_price_seen` mutate only under the trailing-stop ratchet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: f64,
    pub quantity: f64,
    /// Quote spent on entry, fees included
    pub entry_cost_with_fees: f64,
    pub open_time: DateTime<Utc>,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub highest_price_seen: f64,
}

impl Position {
    /// Price at which the stop-loss fires.
    pub fn stop_price(&self) -> f64 {
        self.entry_price * (1.0 - self.stop_loss_pct)
    }

    /// Price at which the take-profit fires.
    pub fn take_profit_price(&self) -> f64 {
        self.entry_price * (1.0 + self.take_profit_pct)
    }

    pub fn unrealized_pnl_pct(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitTrigger {
    /// Past `force_sell_time`: exit unconditionally
    TimeoutHard,
    /// Past `max_hold_time` and in profit
    TimeoutSoft,
    StopLoss,
    TakeProfit,
}

impl ExitTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitTrigger::TimeoutHard => "TIMEOUT_HARD",
            ExitTrigger::TimeoutSoft => "TIMEOUT_SOFT",
            ExitTrigger::StopLoss => "STOP_LOSS",
            ExitTrigger::TakeProfit => "TAKE_PROFIT",
        }
    }
}

/// Ratchet the stop upward as price advances: track the highest price seen and
/// lift `stop_loss_pct` whenever `highest * (1 - distance)` beats the current
/// stop price. The effective stop price never decreases. Returns whether the
/// stop moved.
pub fn apply_trailing_stop(position: &mut Position, current_price: f64, distance: f64) -> bool {
    if current_price > position.highest_price_seen {
        position.highest_price_seen = current_price;
    }

    let candidate_stop = position.highest_price_seen * (1.0 - distance);
    if candidate_stop > position.stop_price() {
        position.stop_loss_pct = 1.0 - candidate_stop / position.entry_price;
        true
    } else {
        false
    }
}

/// Evaluate the exit triggers in precedence order.
pub fn evaluate_exit(
    position: &Position,
    current_price: f64,
    now: DateTime<Utc>,
    cfg: &TradingConfig,
) -> Option<ExitTrigger> {
    let held = now - position.open_time;

    if held >= Duration::seconds(cfg.force_sell_time_secs) {
        return Some(ExitTrigger::TimeoutHard);
    }

    if held >= Duration::seconds(cfg.max_hold_time_secs)
        && position.unrealized_pnl_pct(current_price) > 0.0
    {
        return Some(ExitTrigger::TimeoutSoft);
    }

    if current_price <= position.stop_price() {
        return Some(ExitTrigger::StopLoss);
    }

    if current_price >= position.take_profit_price() {
        return Some(ExitTrigger::TakeProfit);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(entry: f64, stop_pct: f64, tp_pct: f64) -> Position {
        Position {
            symbol: "BTCUSDT".to_string(),
            entry_price: entry,
            quantity: 1.0,
            entry_cost_with_fees: entry,
            open_time: Utc::now(),
            stop_loss_pct: stop_pct,
            take_profit_pct: tp_pct,
            highest_price_seen: entry,
        }
    }

    fn cfg() -> TradingConfig {
        TradingConfig::default()
    }

    #[test]
    fn test_hard_timeout_beats_stop_loss() {
        let mut pos = position(100.0, 0.05, 0.10);
        let now = Utc::now();
        pos.open_time = now - Duration::seconds(cfg().force_sell_time_secs + 60);

        // Price is deep below the stop, but the hard timeout wins
        let trigger = evaluate_exit(&pos, 80.0, now, &cfg());
        assert_eq!(trigger, Some(ExitTrigger::TimeoutHard));
    }

    #[test]
    fn test_soft_timeout_requires_profit() {
        let mut pos = position(100.0, 0.5, 10.0);
        let now = Utc::now();
        pos.open_time = now - Duration::seconds(cfg().max_hold_time_secs + 60);

        assert_eq!(
            evaluate_exit(&pos, 101.0, now, &cfg()),
            Some(ExitTrigger::TimeoutSoft)
        );
        // At a loss the position is held
        assert_eq!(evaluate_exit(&pos, 99.0, now, &cfg()), None);
    }

    #[test]
    fn test_stop_loss_and_take_profit_levels() {
        let pos = position(100.0, 0.05, 0.10);
        let now = Utc::now();

        assert_eq!(evaluate_exit(&pos, 95.0, now, &cfg()), Some(ExitTrigger::StopLoss));
        assert_eq!(
            evaluate_exit(&pos, 110.0, now, &cfg()),
            Some(ExitTrigger::TakeProfit)
        );
        assert_eq!(evaluate_exit(&pos, 100.0, now, &cfg()), None);
    }

    #[test]
    fn test_trailing_stop_triggers_above_raw_stop() {
        // Entry 100, ATR stop 6%, trailing distance 4%; price runs to 120
        // then falls back to 114.
        let mut pos = position(100.0, 0.06, 0.50);

        apply_trailing_stop(&mut pos, 120.0, 0.04);
        assert_eq!(pos.highest_price_seen, 120.0);
        assert!((pos.stop_price() - 115.2).abs() < 1e-9);

        // 114 is below the trailed stop even though the raw stop (94) never hit
        let trigger = evaluate_exit(&pos, 114.0, Utc::now(), &cfg());
        assert_eq!(trigger, Some(ExitTrigger::StopLoss));
    }

    #[test]
    fn test_trailing_stop_never_ratchets_down() {
        let mut pos = position(100.0, 0.06, 0.50);

        apply_trailing_stop(&mut pos, 120.0, 0.04);
        let stop_after_high = pos.stop_price();

        // Price retreats; highest and stop stay pinned
        let moved = apply_trailing_stop(&mut pos, 105.0, 0.04);
        assert!(!moved);
        assert_eq!(pos.highest_price_seen, 120.0);
        assert_eq!(pos.stop_price(), stop_after_high);
    }

    #[test]
    fn test_trailing_stop_monotone_over_cycles() {
        let mut pos = position(100.0, 0.06, 1.0);
        let mut last_stop = pos.stop_price();

        for price in [98.0, 103.0, 101.0, 110.0, 108.0, 120.0, 114.0] {
            apply_trailing_stop(&mut pos, price, 0.04);
            assert!(pos.stop_price() >= last_stop - 1e-12);
            last_stop = pos.stop_price();
        }
    }

    #[test]
    fn test_trailing_inactive_while_candidate_below_stop() {
        // Wide distance: 8% below the high is still under the 6% entry stop
        let mut pos = position(100.0, 0.06, 0.50);
        let moved = apply_trailing_stop(&mut pos, 101.0, 0.08);
        assert!(!moved);
        assert!((pos.stop_price() - 94.0).abs() < 1e-9);
    }
}
