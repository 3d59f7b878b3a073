//! Order lifecycle state machine.
//!
//! ```text
//! PENDING ──reserve+insert──▶ OPEN ──fill──▶ PARTIALLY_FILLED ──fill──▶ FILLED
//!    │                         │ │                 │  ▲   │
//!    │                         │ └─────fill────────┼──┼───┴──▶ FILLED
//!    │                         │                   └──┘ fill
//!    │                         └──cancel/expire──▶ CANCELLED | EXPIRED
//!    ├──reject──▶ REJECTED        (also from PARTIALLY_FILLED)
//!    └──cancel/expire──▶ CANCELLED | EXPIRED   (parked stop orders only)
//! ```
//!
//! Terminal states accept no transition at all. Attempting one is an error
//! because it means some caller lost track of the order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Order, Result, SpotmatchError};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted for processing; not yet funded or in the book.
    /// Parked stop orders stay here until triggered.
    Pending,
    /// Funded and resting (or about to match).
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    /// Refused before touching the book.
    Rejected,
}

impl OrderStatus {
    /// FILLED, CANCELLED, EXPIRED and REJECTED are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Expired | Self::Rejected
        )
    }

    /// States a resting order can be cancelled from.
    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }

    /// Can an order in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        use OrderStatus::{Cancelled, Expired, Filled, Open, PartiallyFilled, Pending, Rejected};
        matches!(
            (self, target),
            (Pending, Open | Rejected | Cancelled | Expired)
                | (Open, PartiallyFilled | Filled | Cancelled | Expired)
                | (PartiallyFilled, PartiallyFilled | Filled | Cancelled | Expired)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl Order {
    /// Move the order to `to`, enforcing the lifecycle table.
    ///
    /// # Errors
    /// [`SpotmatchError::InvalidTransition`] if the move is not allowed.
    pub fn transition(&mut self, to: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(SpotmatchError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}
