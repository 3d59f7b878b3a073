//! Events the engine publishes to its sinks.
//!
//! Everything here is plain data: the engine builds an [`EngineEvent`] under
//! the pair lock and hands a reference to every registered sink.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MarketPair, Order, OrderId, OrderSide, OrderStatus, Trade, TradeId, UserId};

/// Public trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: TradeId,
    pub pair: MarketPair,
    pub price: Decimal,
    pub quantity: Decimal,
    pub taker_side: OrderSide,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub timestamp: DateTime<Utc>,
}

impl From<&Trade> for TradeEvent {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.id,
            pair: trade.pair.clone(),
            price: trade.price,
            quantity: trade.quantity,
            taker_side: trade.taker_side,
            maker_order_id: trade.maker_order_id,
            taker_order_id: trade.taker_order_id,
            timestamp: trade.executed_at,
        }
    }
}

/// Private order state change, addressed to the order's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub owner: UserId,
    pub pair: MarketPair,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub remaining_qty: Decimal,
    pub avg_fill_price: Decimal,
    /// Why the order was rejected or cancelled, when the engine knows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderUpdate {
    #[must_use]
    pub fn from_order(order: &Order, reason: Option<String>) -> Self {
        Self {
            order_id: order.id,
            owner: order.owner,
            pair: order.pair.clone(),
            status: order.status,
            filled_qty: order.filled_qty,
            remaining_qty: order.remaining_qty,
            avg_fill_price: order.avg_fill_price,
            reason,
        }
    }
}

/// Top of book after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTop {
    pub pair: MarketPair,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// Category of an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// A trade was aborted because the ledger could not settle it.
    SettlementAborted,
    /// A triggered stop order failed resubmission.
    StopRejected,
    /// A release asked for more than was locked.
    LockedUnderflow,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SettlementAborted => write!(f, "SETTLEMENT_ABORTED"),
            Self::StopRejected => write!(f, "STOP_REJECTED"),
            Self::LockedUnderflow => write!(f, "LOCKED_UNDERFLOW"),
        }
    }
}

/// Something that needs operator attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub pair: MarketPair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Everything a sink can receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Trade(TradeEvent),
    OrderUpdated(OrderUpdate),
    BookChanged(BookTop),
    Alert(Alert),
}

impl EngineEvent {
    /// The pair the event concerns.
    #[must_use]
    pub fn pair(&self) -> &MarketPair {
        match self {
            Self::Trade(e) => &e.pair,
            Self::OrderUpdated(e) => &e.pair,
            Self::BookChanged(e) => &e.pair,
            Self::Alert(e) => &e.pair,
        }
    }

    #[must_use]
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert(_))
    }
}
