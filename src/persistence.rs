//! State snapshot persistence.
//!
//! The engine exposes its position slot and daily counters after every
//! acted-on cycle; this module writes them to disk so an external process (or
//! a restart) can inspect the last known state. Write failures are logged and
//! never interrupt trading.

use crate::errors::BotResult;
use crate::risk::DailyRiskState;
use crate::trader::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub position: Option<Position>,
    pub risk: DailyRiskState,
    pub updated_at: DateTime<Utc>,
}

pub fn save_snapshot(path: &str, snapshot: &EngineSnapshot) -> BotResult<()> {
    let content = serde_json::to_string_pretty(snapshot)?;
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_snapshot(path: &str) -> BotResult<EngineSnapshot> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
