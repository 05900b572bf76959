//! Typed errors for sizing, admission control, and collaborator failures.
//!
//! Nothing here is fatal inside the trading loop: admission rejections skip
//! the candidate, collaborator failures are retried on the next cycle, and
//! persistence failures leave the in-memory state authoritative.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input to a sizing or entry computation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Stop distance is zero or on the wrong side of entry.
    #[error("invalid stop: {0}")]
    InvalidStop(String),

    /// The smallest tradable unit already exceeds the risk budget.
    #[error("risk exceeded: {risk_per_unit} per unit against budget {budget}")]
    RiskExceeded {
        risk_per_unit: Decimal,
        budget: Decimal,
    },

    /// Not enough capital for even one unit after downsizing.
    #[error("insufficient capital: required {required}, available {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },

    /// Position cost exceeds the account's available (non-margined) balance.
    #[error("insufficient margin: cost {required} exceeds available {available}")]
    InsufficientMargin {
        required: Decimal,
        available: Decimal,
    },

    /// A position for this symbol is already active.
    #[error("duplicate position for {symbol}")]
    DuplicatePosition { symbol: String },

    /// Two-leg pricing produced a non-positive net debit.
    #[error("invalid spread: net debit {net_debit} is not positive")]
    InvalidSpread { net_debit: Decimal },

    /// Not enough market data to compute (e.g. too few bars for a range).
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Broker or resolver call failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Shared-store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_stop(msg: impl Into<String>) -> Self {
        Self::InvalidStop(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    /// True for admission-control rejections: the candidate is dropped and
    /// not retried this cycle.
    #[must_use]
    pub fn is_admission_reject(&self) -> bool {
        matches!(
            self,
            Self::RiskExceeded { .. }
                | Self::InsufficientCapital { .. }
                | Self::InsufficientMargin { .. }
                | Self::DuplicatePosition { .. }
        )
    }

    /// True when the same call may succeed on the next loop iteration.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalService(_) | Self::Persistence(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
