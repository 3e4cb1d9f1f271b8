//! Error types for the staking engine

use thiserror::Error;

/// Result type for staking operations
pub type Result<T> = std::result::Result<T, Error>;

/// Staking and exchange errors
///
/// Every failure aborts the whole action; the engine rolls back any
/// mutation made before the error was raised.
#[derive(Error, Debug)]
pub enum Error {
    /// Negative, zero, symbol- or precision-mismatched asset argument
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Fund, delegation or pool lacks the amount being withdrawn or sold
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Pool cannot honor a rental or sale right now
    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    /// Business rule violated (voting requirement, missing loan, ...)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Internal invariant violated (pool totals mismatch, ...)
    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-matchable identifier of the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InsufficientBalance(_) => "insufficient_balance",
            Error::InsufficientLiquidity(_) => "insufficient_liquidity",
            Error::PreconditionFailed(_) => "precondition_failed",
            Error::StateInconsistency(_) => "state_inconsistency",
            Error::ArithmeticOverflow(_) => "arithmetic_overflow",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidAmount(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionFailed(msg.into())
    }

    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        Error::StateInconsistency(msg.into())
    }
}

/// Fail with `PreconditionFailed` unless `cond` holds
pub(crate) fn ensure(cond: bool, msg: &str) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::precondition(msg))
    }
}
