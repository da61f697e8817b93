//! Sentiment verdict types and boundary normalization.
//!
//! Oracle payloads are loosely shaped text. Everything entering the engine
//! passes through [`SentimentVerdict::from_json`], which back-fills missing
//! fields from the neutral template, coerces types and clamps ranges, so the
//! rest of the code never inspects raw JSON.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NEUTRAL_SCORE: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    VeryPositive,
    Positive,
    Neutral,
    Negative,
    VeryNegative,
}

impl SentimentLabel {
    /// Case- and language-insensitive label matching; anything unrecognized
    /// reads neutral.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        if upper.contains("VERY POSITIVE") || upper.contains("MUITO POSITIVO") {
            SentimentLabel::VeryPositive
        } else if upper.contains("VERY NEGATIVE") || upper.contains("MUITO NEGATIVO") {
            SentimentLabel::VeryNegative
        } else if upper.contains("POSITIV") {
            SentimentLabel::Positive
        } else if upper.contains("NEGATIV") {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::VeryPositive => "very_positive",
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
            SentimentLabel::VeryNegative => "very_negative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyRecommendation {
    Yes,
    No,
    Neutral,
}

impl BuyRecommendation {
    /// Match the oracle's free-form recommendation string into the 3-value
    /// enum, defaulting to Neutral when ambiguous. Affirmatives are checked
    /// first so "YES, NOT FINANCIAL ADVICE" style answers read as Yes.
    pub fn parse(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        if upper.contains("YES") || upper.contains("BUY") || upper.contains("SIM")
            || upper.contains("COMPRA")
        {
            BuyRecommendation::Yes
        } else if upper.contains("NÃO") || upper.contains("NAO") || upper.contains("NOT")
            || upper.contains("NO")
        {
            BuyRecommendation::No
        } else {
            BuyRecommendation::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuyRecommendation::Yes => "YES",
            BuyRecommendation::No => "NO",
            BuyRecommendation::Neutral => "NEUTRAL",
        }
    }
}

/// Per-source sentiment labels reported by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLabels {
    pub reddit: SentimentLabel,
    pub news: SentimentLabel,
    pub twitter: SentimentLabel,
}

impl Default for SourceLabels {
    fn default() -> Self {
        Self {
            reddit: SentimentLabel::Neutral,
            news: SentimentLabel::Neutral,
            twitter: SentimentLabel::Neutral,
        }
    }
}

/// Validated sentiment verdict. `degraded` marks the default-neutral verdict
/// produced when every oracle path failed; degraded verdicts are never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub sentiment: SentimentLabel,
    pub score: i64,
    pub buy_recommendation: BuyRecommendation,
    pub key_factors: Vec<String>,
    pub source_labels: SourceLabels,
    pub degraded: bool,
}

impl SentimentVerdict {
    /// The default verdict used when no analysis is available.
    pub fn neutral_default(coin: &str) -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: NEUTRAL_SCORE,
            buy_recommendation: BuyRecommendation::Neutral,
            key_factors: vec![format!("Sentiment analysis inconclusive for {}", coin)],
            source_labels: SourceLabels::default(),
            degraded: true,
        }
    }

    /// Normalize an arbitrary JSON payload into a valid verdict.
    pub fn from_json(value: &Value, coin: &str) -> Self {
        let obj = match value.as_object() {
            Some(o) => o,
            None => return Self::neutral_default(coin),
        };

        let sentiment = obj
            .get("sentiment")
            .and_then(Value::as_str)
            .map(SentimentLabel::parse)
            .unwrap_or(SentimentLabel::Neutral);

        let score = coerce_score(obj.get("score")).clamp(0, 100);

        let buy_recommendation = obj
            .get("buy_recommendation")
            .and_then(Value::as_str)
            .map(BuyRecommendation::parse)
            .unwrap_or(BuyRecommendation::Neutral);

        let key_factors = coerce_key_factors(obj.get("key_factors"));

        let source_label = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(SentimentLabel::parse)
                .unwrap_or(SentimentLabel::Neutral)
        };

        Self {
            sentiment,
            score,
            buy_recommendation,
            key_factors,
            source_labels: SourceLabels {
                reddit: source_label("reddit_sentiment"),
                news: source_label("news_sentiment"),
                twitter: source_label("twitter_sentiment"),
            },
            degraded: false,
        }
    }
}

fn coerce_score(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .unwrap_or(NEUTRAL_SCORE),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(NEUTRAL_SCORE),
        _ => NEUTRAL_SCORE,
    }
}

fn coerce_key_factors(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => vec!["No factors reported".to_string()],
    }
}

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("valid regex"));

/// Pull the first JSON object out of raw oracle text: fenced blocks first,
/// then a balanced-brace scan for models that answer with prose around the
/// payload.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(captures) = JSON_FENCE.captures(text) {
        if let Ok(value) = serde_json::from_str(captures.get(1)?.as_str()) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_clamped_to_range() {
        let verdict = SentimentVerdict::from_json(&json!({"score": 250}), "BTC");
        assert_eq!(verdict.score, 100);

        let verdict = SentimentVerdict::from_json(&json!({"score": -10}), "BTC");
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn test_string_score_coerced() {
        let verdict = SentimentVerdict::from_json(&json!({"score": "72"}), "BTC");
        assert_eq!(verdict.score, 72);

        let verdict = SentimentVerdict::from_json(&json!({"score": "plenty"}), "BTC");
        assert_eq!(verdict.score, NEUTRAL_SCORE);
    }

    #[test]
    fn test_missing_fields_backfilled() {
        let verdict = SentimentVerdict::from_json(&json!({}), "ETH");
        assert_eq!(verdict.score, NEUTRAL_SCORE);
        assert_eq!(verdict.sentiment, SentimentLabel::Neutral);
        assert_eq!(verdict.buy_recommendation, BuyRecommendation::Neutral);
        assert!(!verdict.key_factors.is_empty());
        assert!(!verdict.degraded);
    }

    #[test]
    fn test_non_object_payload_degrades() {
        let verdict = SentimentVerdict::from_json(&json!([1, 2, 3]), "ETH");
        assert!(verdict.degraded);
    }

    #[test]
    fn test_recommendation_language_matching() {
        assert_eq!(BuyRecommendation::parse("yes"), BuyRecommendation::Yes);
        assert_eq!(BuyRecommendation::parse("Strong Buy"), BuyRecommendation::Yes);
        assert_eq!(BuyRecommendation::parse("SIM"), BuyRecommendation::Yes);
        assert_eq!(BuyRecommendation::parse("não"), BuyRecommendation::No);
        assert_eq!(BuyRecommendation::parse("do not"), BuyRecommendation::No);
        assert_eq!(BuyRecommendation::parse("hold"), BuyRecommendation::Neutral);
    }

    #[test]
    fn test_sentiment_label_parsing() {
        assert_eq!(SentimentLabel::parse("muito positivo"), SentimentLabel::VeryPositive);
        assert_eq!(SentimentLabel::parse("Positive"), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::parse("negativo"), SentimentLabel::Negative);
        assert_eq!(SentimentLabel::parse("whatever"), SentimentLabel::Neutral);
    }

    #[test]
    fn test_key_factors_string_coerced_to_list() {
        let verdict =
            SentimentVerdict::from_json(&json!({"key_factors": "ETF inflows"}), "BTC");
        assert_eq!(verdict.key_factors, vec!["ETF inflows".to_string()]);
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let text = "Here is my analysis:\n```json\n{\"score\": 80}\n```\nHope it helps.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], 80);
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Sure! {\"score\": 65, \"sentiment\": \"positive\"} -- done";
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], 65);
    }

    #[test]
    fn test_extract_json_handles_nested_braces_in_strings() {
        let text = r#"{"key_factors": ["odd { brace"], "score": 40}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], 40);
    }

    #[test]
    fn test_extract_json_none_on_garbage() {
        assert!(extract_json("no json here").is_none());
    }
}
