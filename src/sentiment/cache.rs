//! Hour-bucketed verdict cache.
//!
//! Keys are `(symbol, floor(unix_time / 3600))`, so a verdict only ever
//! serves requests from the same wall-clock hour, and the TTL bounds its age
//! inside that hour. Lookups never return stale entries. All methods take
//! `now` explicitly so TTL behavior is testable without waiting.

use crate::sentiment::verdict::SentimentVerdict;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

const HOUR_SECS: i64 = 3600;

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: DateTime<Utc>,
    verdict: SentimentVerdict,
}

pub struct VerdictCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, i64), CacheEntry>>,
}

fn hour_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(HOUR_SECS)
}

impl VerdictCache {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.max(0)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh cached verdict for this symbol's current hour bucket, if any.
    pub async fn get(&self, symbol: &str, now: DateTime<Utc>) -> Option<SentimentVerdict> {
        let entries = self.entries.lock().await;
        let entry = entries.get(&(symbol.to_string(), hour_bucket(now)))?;
        if now - entry.inserted_at < self.ttl {
            Some(entry.verdict.clone())
        } else {
            None
        }
    }

    /// Store a verdict under the current hour bucket. Callers must not cache
    /// degraded defaults; a later request in the same bucket should retry.
    pub async fn put(&self, symbol: &str, verdict: SentimentVerdict, now: DateTime<Utc>) {
        debug_assert!(!verdict.degraded);
        let mut entries = self.entries.lock().await;
        entries.insert(
            (symbol.to_string(), hour_bucket(now)),
            CacheEntry {
                inserted_at: now,
                verdict,
            },
        );
    }

    /// Drop entries past their TTL. Returns how many were removed.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now - entry.inserted_at < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
