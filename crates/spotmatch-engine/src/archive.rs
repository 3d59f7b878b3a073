//! Bounded retention of terminal orders.
//!
//! Filled, cancelled, expired and rejected orders stay queryable for a
//! while after they leave the book. Once more than `capacity` are held the
//! oldest is evicted, and its id is handed back so the engine can forget
//! where it was routed.

use std::collections::{HashMap, VecDeque};

use spotmatch_types::{Order, OrderId};

#[derive(Debug)]
pub(crate) struct TerminalArchive {
    orders: HashMap<OrderId, Order>,
    /// Archival order (front = oldest).
    order: VecDeque<OrderId>,
    capacity: usize,
}

impl TerminalArchive {
    /// An archive holding at most `capacity` orders (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            orders: HashMap::with_capacity(capacity.min(4096)),
            order: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Archive `order`, returning the ids evicted to make room.
    pub fn insert(&mut self, order: Order) -> Vec<OrderId> {
        let id = order.id;
        if self.orders.insert(id, order).is_some() {
            return Vec::new();
        }
        self.order.push_back(id);

        let mut evicted = Vec::new();
        while self.orders.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.orders.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use spotmatch_types::OrderSide;

    use super::*;

    fn order() -> Order {
        Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE)
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut archive = TerminalArchive::new(2);
        let (a, b, c) = (order(), order(), order());
        let ids = (a.id, b.id, c.id);

        assert!(archive.insert(a).is_empty());
        assert!(archive.insert(b).is_empty());
        assert_eq!(archive.insert(c), vec![ids.0]);

        assert_eq!(archive.orders.len(), 2);
        assert!(archive.get(&ids.0).is_none());
        assert!(archive.get(&ids.1).is_some());
        assert!(archive.get(&ids.2).is_some());
    }

    #[test]
    fn rearchiving_replaces_without_evicting() {
        let mut archive = TerminalArchive::new(1);
        let mut first = order();
        let id = first.id;
        archive.insert(first.clone());
        first.filled_qty = Decimal::ONE;
        assert!(archive.insert(first).is_empty());
        assert_eq!(archive.get(&id).unwrap().filled_qty, Decimal::ONE);
    }
}
