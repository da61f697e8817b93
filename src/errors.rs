use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient data for {indicator}: need {needed} bars, have {available}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("Sentiment oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Malformed oracle response: {0}")]
    OracleMalformed(String),

    #[error("Order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("Connectivity lost: {0}")]
    ConnectivityLost(String),

    #[error("Exit execution failed for {symbol}: {reason}")]
    ExitExecutionFailure { symbol: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// Whether the failure is transient and worth retrying on a later cycle.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BotError::OracleUnavailable(_) => true,
            BotError::ConnectivityLost(_) => true,
            BotError::ExitExecutionFailure { .. } => true,
            BotError::Http(_) => true,
            BotError::InsufficientData { .. } => true,
            _ => false,
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;
