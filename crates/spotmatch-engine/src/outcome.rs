//! What `submit_order` and `cancel_order` hand back to the caller.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spotmatch_types::{Order, OrderId, OrderStatus, Trade};

/// Outcome of a submission once its matching loop has run to completion.
///
/// FOK orders that cannot fill come back here with status `REJECTED`, not
/// as an error: the request was well-formed, the market just could not
/// take it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub average_fill_price: Decimal,
    /// Trades this order took part in during the submission.
    pub trades: Vec<Trade>,
}

impl OrderResult {
    #[must_use]
    pub fn from_order(order: &Order, trades: Vec<Trade>) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            filled_quantity: order.filled_qty,
            remaining_quantity: order.remaining_qty,
            average_fill_price: order.avg_fill_price,
            trades,
        }
    }

    #[must_use]
    pub fn is_resting(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

/// Outcome of a cancel or expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: OrderId,
    /// `CANCELLED` or `EXPIRED`.
    pub status: OrderStatus,
    /// Reserved funds returned to available balance.
    pub released: Decimal,
}
