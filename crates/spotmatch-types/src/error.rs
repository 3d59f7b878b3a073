//! Error types for the SpotMatch matching core.
//!
//! All errors use the `SM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order errors
//! - 2xx: Balance errors
//! - 3xx: Market errors
//! - 6xx: Settlement errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{MarketPair, OrderId, OrderStatus, TradeId};

/// Central error enum for all SpotMatch operations.
#[derive(Debug, Error)]
pub enum SpotmatchError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The order is malformed (missing price, non-positive quantity, ...).
    #[error("SM_ERR_100: Validation failed: {reason}")]
    ValidationError { reason: String },

    /// The requested order does not exist.
    #[error("SM_ERR_101: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this ID is already resting.
    #[error("SM_ERR_102: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The caller does not own the order.
    #[error("SM_ERR_103: Order {0} is not owned by the requesting user")]
    NotOwner(OrderId),

    /// The order is in a state that cannot be cancelled.
    #[error("SM_ERR_104: Order cannot be cancelled in state {status}")]
    NotCancellable { status: OrderStatus },

    /// A lifecycle transition that the state machine forbids.
    #[error("SM_ERR_105: Illegal order transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance to reserve.
    #[error("SM_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A release asked for more than is locked. The locked balance was
    /// released up to what existed.
    #[error("SM_ERR_201: Locked balance underflow: requested {requested}, released {released}")]
    LockedUnderflow { requested: Decimal, released: Decimal },

    /// A withdrawal or amount argument was not positive.
    #[error("SM_ERR_202: Invalid amount: {0}")]
    InvalidAmount(Decimal),

    // =================================================================
    // Market Errors (3xx)
    // =================================================================
    /// The pair is not configured on this engine.
    #[error("SM_ERR_300: Trading pair not found: {0}")]
    PairNotFound(MarketPair),

    /// The pair exists but is not accepting orders.
    #[error("SM_ERR_301: Trading pair inactive: {0}")]
    PairInactive(MarketPair),

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// A trade could not be settled against the reserved balances.
    #[error("SM_ERR_600: Settlement inconsistency: {reason}")]
    SettlementInconsistency { reason: String },

    /// A trade has already been settled (idempotency guard).
    #[error("SM_ERR_601: Trade already settled: {0}")]
    TradeAlreadySettled(TradeId),

    /// Supply conservation invariant violated.
    #[error("SM_ERR_602: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SM_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("SM_ERR_903: I/O error: {0}")]
    Io(String),
}

impl SpotmatchError {
    /// Shorthand for [`SpotmatchError::ValidationError`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationError {
            reason: reason.into(),
        }
    }

    /// `true` for errors the caller can fix by changing the request.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. }
                | Self::OrderNotFound(_)
                | Self::NotOwner(_)
                | Self::NotCancellable { .. }
                | Self::InsufficientBalance { .. }
                | Self::InvalidAmount(_)
                | Self::PairNotFound(_)
                | Self::PairInactive(_)
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SpotmatchError>;

impl From<std::io::Error> for SpotmatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SpotmatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
