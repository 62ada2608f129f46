// Unified error handling for the trade bot
//
// Replaces Box<dyn Error> throughout the application with a typed taxonomy
// that the retry and session-recovery paths can inspect.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeError {
    /// The Steam session died mid-operation. Triggers re-authentication as a
    /// side effect; the original failure still propagates to the caller.
    #[error("Session error: {0}")]
    Session(String),

    /// The partner's items would be held in escrow. Fails offer creation
    /// outright, no retry.
    #[error("Partner items held in escrow for {days} days")]
    Escrow { days: u32 },

    /// Generic network/remote failure. Drives the bounded-retry policies.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed input (e.g. an invalid trade URL). Fails fast, no retry.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration problem detected at load or wiring time.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TradeError {
    /// Only transport failures are eligible for the bounded-retry loops.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradeError::Transport(_))
    }

    /// Error category for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            TradeError::Session(_) => "session",
            TradeError::Escrow { .. } => "escrow",
            TradeError::Transport(_) => "transport",
            TradeError::Validation(_) => "validation",
            TradeError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for TradeError {
    fn from(err: reqwest::Error) -> Self {
        TradeError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for TradeError {
    fn from(err: serde_json::Error) -> Self {
        TradeError::Transport(format!("malformed JSON payload: {}", err))
    }
}

impl From<std::io::Error> for TradeError {
    fn from(err: std::io::Error) -> Self {
        TradeError::Transport(format!("IO error: {}", err))
    }
}

impl From<crate::config::ConfigError> for TradeError {
    fn from(err: crate::config::ConfigError) -> Self {
        TradeError::Config(err.to_string())
    }
}

/// Result type alias using TradeError
pub type TradeResult<T> = Result<T, TradeError>;
