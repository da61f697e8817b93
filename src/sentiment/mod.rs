//! Sentiment oracle adapter: validated verdicts from an LLM-backed scoring
//! service, with caching, bounded retry and fallback.

pub mod analyzer;
pub mod cache;
pub mod oracle;
pub mod prompts;
pub mod retry;
pub mod verdict;

pub use analyzer::SentimentAnalyzer;
pub use cache::VerdictCache;
pub use oracle::{HttpOracle, SentimentOracle};
pub use retry::RetryPolicy;
pub use verdict::{BuyRecommendation, SentimentLabel, SentimentVerdict};
