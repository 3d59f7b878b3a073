//! Trade records produced by the matching loop.
//!
//! A [`Trade`] is the immutable record of one fill between the resting
//! (maker) order and the incoming (taker) order, executed at the maker's
//! price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, MarketPair, OrderId, OrderSide, TradeId, UserId};

/// One fill. Created exactly once per match event and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Per-pair trade sequence (starts at 1).
    pub sequence: u64,
    pub pair: MarketPair,
    /// The resting order.
    pub maker_order_id: OrderId,
    pub maker_user_id: UserId,
    /// The incoming order.
    pub taker_order_id: OrderId,
    pub taker_user_id: UserId,
    /// Which side the taker was on.
    pub taker_side: OrderSide,
    /// Executed quantity in base currency.
    pub quantity: Decimal,
    /// Execution price (the maker's price).
    pub price: Decimal,
    /// Quote amount = price × quantity.
    pub quote_amount: Decimal,
    /// Fee charged to the taker.
    pub fee: Decimal,
    /// Currency the fee was taken in (whatever the taker received).
    pub fee_currency: Currency,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quote_amount
    }

    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == OrderSide::Buy
    }

    /// `(buyer, seller)` user ids.
    #[must_use]
    pub fn counterparties(&self) -> (UserId, UserId) {
        if self.taker_is_buyer() {
            (self.taker_user_id, self.maker_user_id)
        } else {
            (self.maker_user_id, self.taker_user_id)
        }
    }

    /// `(buy order, sell order)` ids.
    #[must_use]
    pub fn order_ids(&self) -> (OrderId, OrderId) {
        if self.taker_is_buyer() {
            (self.taker_order_id, self.maker_order_id)
        } else {
            (self.maker_order_id, self.taker_order_id)
        }
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} {} @ {} = {} (fee {} {})",
            self.id,
            self.pair,
            self.taker_side,
            self.quantity,
            self.price,
            self.quote_amount,
            self.fee,
            self.fee_currency,
        )
    }
}
