//! The order book for a single market pair.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>` -- lowest price first
//!
//! Orders live in an arena (`HashMap<OrderId, Order>`); levels hold only ids.
//! A fill mutates the order in place, so a partially filled order keeps its
//! place in the queue.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spotmatch_types::{
    MarketPair, Order, OrderId, OrderSide, Result, SpotmatchError, UserId, constants,
};

use crate::price_level::PriceLevel;
use crate::snapshot::{BookSnapshot, LevelSnapshot};

/// Resting orders for one pair.
#[derive(Debug)]
pub struct OrderBook {
    /// The market this book serves (e.g., BTC/USD).
    pub pair: MarketPair,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Arena of every resting order.
    orders: HashMap<OrderId, Order>,
}

/// Two front orders that would trade, as seen by [`OrderBook::matchable_pairs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub bid_id: OrderId,
    pub ask_id: OrderId,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    /// `min` of the two residual quantities at this point of the walk.
    pub quantity: Decimal,
}

impl OrderBook {
    #[must_use]
    pub fn new(pair: MarketPair) -> Self {
        Self {
            pair,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion / removal
    // =================================================================

    /// Queue an order at its working price behind everything already there.
    pub fn insert(&mut self, order: Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(SpotmatchError::DuplicateOrder(order.id));
        }
        if order.pair != self.pair {
            return Err(SpotmatchError::validation(format!(
                "order for {} inserted into {} book",
                order.pair, self.pair
            )));
        }
        let price = order
            .working_price()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| SpotmatchError::validation("order has no working price"))?;
        if order.remaining_qty <= Decimal::ZERO {
            return Err(SpotmatchError::validation("order has nothing left to rest"));
        }

        match order.side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(order.id, order.remaining_qty),
            OrderSide::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .push_back(order.id, order.remaining_qty),
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Take an order out of the book. Unknown ids are `OrderNotFound`.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order> {
        let price = self
            .orders
            .get(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))
            .and_then(resting_price)?;
        let order = self
            .orders
            .remove(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))?;
        self.detach(order.side, price, order_id, order.remaining_qty);
        Ok(order)
    }

    /// Apply a fill of `qty` at `price` to a resting order.
    ///
    /// The order stays at its queue position while it has quantity left.
    /// When it is exhausted it is removed and returned.
    pub fn fill(
        &mut self,
        order_id: &OrderId,
        qty: Decimal,
        price: Decimal,
    ) -> Result<Option<Order>> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))?;
        let level_price = resting_price(order)?;
        order.apply_fill(qty, price)?;
        let side = order.side;
        let filled = order.is_filled();

        match side {
            OrderSide::Buy => {
                if let Some(level) = self.bids.get_mut(&Reverse(level_price)) {
                    level.reduce(qty);
                }
            }
            OrderSide::Sell => {
                if let Some(level) = self.asks.get_mut(&level_price) {
                    level.reduce(qty);
                }
            }
        }

        if !filled {
            return Ok(None);
        }
        self.detach(side, level_price, order_id, Decimal::ZERO);
        Ok(self.orders.remove(order_id))
    }

    /// Lower the funds recorded as reserved for a resting order.
    /// Returns what is still reserved afterwards.
    pub fn consume_locked(&mut self, order_id: &OrderId, amount: Decimal) -> Result<Decimal> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))?;
        order.locked_amount = (order.locked_amount - amount).max(Decimal::ZERO);
        Ok(order.locked_amount)
    }

    fn detach(&mut self, side: OrderSide, price: Decimal, order_id: &OrderId, remaining: Decimal) {
        match side {
            OrderSide::Buy => {
                if let Some(level) = self.bids.get_mut(&Reverse(price)) {
                    level.remove(order_id, remaining);
                    if level.is_empty() {
                        self.bids.remove(&Reverse(price));
                    }
                }
            }
            OrderSide::Sell => {
                if let Some(level) = self.asks.get_mut(&price) {
                    level.remove(order_id, remaining);
                    if level.is_empty() {
                        self.asks.remove(&price);
                    }
                }
            }
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Front order of the best bid level.
    #[must_use]
    pub fn peek_best_bid(&self) -> Option<&Order> {
        self.bids
            .values()
            .next()
            .and_then(PriceLevel::front)
            .and_then(|id| self.orders.get(&id))
    }

    /// Front order of the best ask level.
    #[must_use]
    pub fn peek_best_ask(&self) -> Option<&Order> {
        self.asks
            .values()
            .next()
            .and_then(PriceLevel::front)
            .and_then(|id| self.orders.get(&id))
    }

    /// Best (highest) bid price, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask price, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Spread = best_ask - best_bid. `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Mid price = (best_bid + best_ask) / 2. `None` if either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best bid price ≥ best ask price.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!((self.best_bid(), self.best_ask()), (Some(bid), Some(ask)) if bid >= ask)
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Total number of orders currently in the book.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Number of distinct bid price levels.
    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of distinct ask price levels.
    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Every resting order, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Resting orders belonging to `owner`.
    pub fn orders_for(&self, owner: UserId) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(move |o| o.owner == owner)
    }

    /// Ids of resting orders whose expiry is at or before `now`, oldest first.
    #[must_use]
    pub fn expired_orders(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        let mut expired: Vec<&Order> = self.orders.values().filter(|o| o.is_expired(now)).collect();
        expired.sort_by_key(|o| o.sequence);
        expired.into_iter().map(|o| o.id).collect()
    }

    // =================================================================
    // Iteration (for the matcher)
    // =================================================================

    /// Iterate bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Iterate ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Walk the crossed part of the book in priority order without mutating
    /// it, as if each yielded pair traded `quantity`.
    #[must_use]
    pub fn matchable_pairs(&self) -> MatchablePairs<'_> {
        MatchablePairs {
            orders: &self.orders,
            bids: Box::new(
                self.bids
                    .values()
                    .flat_map(|l| l.iter().map(move |id| (l.price, *id))),
            ),
            asks: Box::new(
                self.asks
                    .values()
                    .flat_map(|l| l.iter().map(move |id| (l.price, *id))),
            ),
            bid: None,
            ask: None,
        }
    }

    /// The two front orders, if the book is crossed.
    #[must_use]
    pub fn crossed_fronts(&self) -> Option<(OrderId, OrderId)> {
        self.matchable_pairs().next().map(|c| (c.bid_id, c.ask_id))
    }

    /// How much of `max` an incoming order on `side` could fill against the
    /// opposite side at prices no worse than `limit` (`None` = any price).
    #[must_use]
    pub fn fillable_quantity(
        &self,
        side: OrderSide,
        limit: Option<Decimal>,
        max: Decimal,
    ) -> Decimal {
        let levels: Box<dyn Iterator<Item = &PriceLevel>> = match side {
            OrderSide::Buy => Box::new(self.asks.values()),
            OrderSide::Sell => Box::new(self.bids.values()),
        };
        let mut available = Decimal::ZERO;
        for level in levels {
            let acceptable = match (side, limit) {
                (_, None) => true,
                (OrderSide::Buy, Some(limit)) => level.price <= limit,
                (OrderSide::Sell, Some(limit)) => level.price >= limit,
            };
            if !acceptable {
                break;
            }
            available += level.total_quantity();
            if available >= max {
                return max;
            }
        }
        available
    }

    // =================================================================
    // Snapshots
    // =================================================================

    /// Aggregated depth, best level first, at most `depth` levels per side.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let depth = depth.min(constants::MAX_SNAPSHOT_DEPTH);
        let aggregate = |level: &PriceLevel| LevelSnapshot {
            price: level.price,
            quantity: level.total_quantity(),
            order_count: level.len(),
        };
        BookSnapshot {
            pair: self.pair.clone(),
            bids: self.bids.values().take(depth).map(aggregate).collect(),
            asks: self.asks.values().take(depth).map(aggregate).collect(),
            taken_at: Utc::now(),
        }
    }
}

/// Read-only walk over the crossed fronts. See [`OrderBook::matchable_pairs`].
pub struct MatchablePairs<'a> {
    orders: &'a HashMap<OrderId, Order>,
    bids: Box<dyn Iterator<Item = (Decimal, OrderId)> + 'a>,
    asks: Box<dyn Iterator<Item = (Decimal, OrderId)> + 'a>,
    /// `(price, id, residual)` of the current front on each side.
    bid: Option<(Decimal, OrderId, Decimal)>,
    ask: Option<(Decimal, OrderId, Decimal)>,
}

impl Iterator for MatchablePairs<'_> {
    type Item = Crossing;

    fn next(&mut self) -> Option<Crossing> {
        let orders = self.orders;
        let residual = |id: &OrderId| orders.get(id).map_or(Decimal::ZERO, |o| o.remaining_qty);
        if self.bid.is_none() {
            self.bid = self.bids.next().map(|(p, id)| (p, id, residual(&id)));
        }
        if self.ask.is_none() {
            self.ask = self.asks.next().map(|(p, id)| (p, id, residual(&id)));
        }
        let (bid_price, bid_id, bid_left) = self.bid?;
        let (ask_price, ask_id, ask_left) = self.ask?;
        if bid_price < ask_price {
            return None;
        }

        let quantity = bid_left.min(ask_left);
        self.bid = (bid_left > quantity).then_some((bid_price, bid_id, bid_left - quantity));
        self.ask = (ask_left > quantity).then_some((ask_price, ask_id, ask_left - quantity));
        Some(Crossing {
            bid_id,
            ask_id,
            bid_price,
            ask_price,
            quantity,
        })
    }
}

/// Price level a resting order is queued at. Every order in the arena was
/// inserted with one.
fn resting_price(order: &Order) -> Result<Decimal> {
    order.working_price().ok_or_else(|| {
        SpotmatchError::Internal(format!("resting order {} has no working price", order.id))
    })
}
