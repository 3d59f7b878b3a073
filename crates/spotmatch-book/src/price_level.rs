//! A single price level in the order book.
//!
//! Order ids at the same price are kept in FIFO order (time priority) in a
//! [`VecDeque`]. The orders themselves live in the book's arena; the level
//! only caches the aggregate resting quantity so depth snapshots stay cheap.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use spotmatch_types::OrderId;

/// All resting order ids at one price.
///
/// The front of the queue has the highest time priority and is matched
/// first. A partial fill never moves an id; only a full fill or a removal
/// takes it out of the queue.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// The price at this level.
    pub price: Decimal,
    queue: VecDeque<OrderId>,
    total_qty: Decimal,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            queue: VecDeque::new(),
            total_qty: Decimal::ZERO,
        }
    }

    /// Append an order with `remaining` quantity (lowest time priority).
    pub fn push_back(&mut self, order_id: OrderId, remaining: Decimal) {
        self.queue.push_back(order_id);
        self.total_qty += remaining;
    }

    /// Id with the highest time priority.
    #[must_use]
    pub fn front(&self) -> Option<OrderId> {
        self.queue.front().copied()
    }

    /// Record that `qty` of some order at this level was filled.
    pub fn reduce(&mut self, qty: Decimal) {
        self.total_qty -= qty;
    }

    /// Take `order_id` out of the queue along with its `remaining` quantity.
    /// Returns `false` if the id was not queued here.
    pub fn remove(&mut self, order_id: &OrderId, remaining: Decimal) -> bool {
        let Some(pos) = self.queue.iter().position(|id| id == order_id) else {
            return false;
        };
        self.queue.remove(pos);
        self.total_qty -= remaining;
        true
    }

    /// Ids in time-priority order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderId> {
        self.queue.iter()
    }

    /// Total remaining quantity across all orders at this level.
    #[must_use]
    pub fn total_quantity(&self) -> Decimal {
        self.total_qty
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of orders at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
