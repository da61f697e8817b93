//! Tag-based console logger.
//!
//! Levels: error/warning/info/debug. Debug lines are only printed when the
//! `--debug` flag was passed at startup.

use chrono::Utc;
use colored::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    Engine,
    Market,
    Scorer,
    Sentiment,
    Ranker,
    Trader,
    Risk,
    Collector,
    Config,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::Engine => "ENGINE",
            LogTag::Market => "MARKET",
            LogTag::Scorer => "SCORER",
            LogTag::Sentiment => "SENTIMENT",
            LogTag::Ranker => "RANKER",
            LogTag::Trader => "TRADER",
            LogTag::Risk => "RISK",
            LogTag::Collector => "COLLECTOR",
            LogTag::Config => "CONFIG",
        }
    }
}

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

/// Enable debug output. Called once at startup.
pub fn enable_debug() {
    DEBUG_MODE.store(true, Ordering::Relaxed);
}

pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn emit(symbol: ColoredString, tag: LogTag, message: &str) {
    println!(
        "{} {} {} {}",
        symbol,
        format!("[{}]", timestamp()).dimmed(),
        tag.as_str().bold(),
        message
    );
    let _ = io::stdout().flush();
}

/// Critical failures; always shown.
pub fn error(tag: LogTag, message: &str) {
    emit("✗".red().bold(), tag, &message.red().to_string());
}

/// Issues that need attention but are not critical.
pub fn warning(tag: LogTag, message: &str) {
    emit("!".yellow().bold(), tag, &message.yellow().to_string());
}

/// Normal operational events.
pub fn info(tag: LogTag, message: &str) {
    emit("·".blue().bold(), tag, message);
}

/// Completed operations worth highlighting.
pub fn success(tag: LogTag, message: &str) {
    emit("✓".green().bold(), tag, &message.green().to_string());
}

/// Verbose diagnostics, gated behind --debug.
pub fn debug(tag: LogTag, message: &str) {
    if is_debug_enabled() {
        emit("»".purple().bold(), tag, &message.dimmed().to_string());
    }
}
