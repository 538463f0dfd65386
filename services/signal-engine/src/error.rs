//! Error taxonomy for the decision engine

use crate::signal::SignalState;

/// Errors produced by the decision engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient price history for {ticker}: {points} point(s), need at least 2")]
    InsufficientHistory { ticker: String, points: usize },

    #[error("insufficient trade history for {ticker}: {closed} closed trade(s), need {required}")]
    InsufficientTradeHistory {
        ticker: String,
        closed: usize,
        required: usize,
    },

    #[error("cannot {operation} {ticker} while in {state} state")]
    InvalidTransition {
        ticker: String,
        state: SignalState,
        operation: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stale state: {document} is at version {on_disk} on disk, loaded version was {loaded}")]
    StaleState {
        document: String,
        on_disk: u64,
        loaded: u64,
    },

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
