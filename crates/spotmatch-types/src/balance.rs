//! Wallet balance for one (user, currency).
//!
//! `available` can fund new orders or be withdrawn; `locked` is reserved by
//! working orders and only leaves through release or settlement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, UserId};

/// A single balance entry for a (user, currency) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBalance {
    pub available: Decimal,
    pub locked: Decimal,
}

impl WalletBalance {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    /// `available + locked`.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.locked.is_zero()
    }

    /// Neither component is negative.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.available >= Decimal::ZERO && self.locked >= Decimal::ZERO
    }
}

impl Default for WalletBalance {
    fn default() -> Self {
        Self::new()
    }
}

/// Ledger key. Field order gives the global lock order: currency code
/// first, then user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct WalletKey {
    pub currency: Currency,
    pub user: UserId,
}

impl WalletKey {
    #[must_use]
    pub fn new(user: UserId, currency: impl Into<Currency>) -> Self {
        Self {
            currency: currency.into(),
            user,
        }
    }
}

impl std::fmt::Display for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user, self.currency)
    }
}
