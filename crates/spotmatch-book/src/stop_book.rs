//! Watch list for stop-family orders.
//!
//! Parked orders are not part of the priced book and hold no reservation.
//! They are indexed by the direction of price movement that fires them:
//!
//! | Order | Side | Fires when |
//! |---|---|---|
//! | StopLoss / StopLimit | Buy | last ≥ stop (rising) |
//! | StopLoss / StopLimit | Sell | last ≤ stop (falling) |
//! | TakeProfit | Buy | last ≤ stop (falling) |
//! | TakeProfit | Sell | last ≥ stop (rising) |

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spotmatch_types::{
    MarketPair, Order, OrderId, OrderSide, OrderType, Result, SpotmatchError, UserId,
};

/// Which way the last trade price has to move to fire an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDirection {
    /// Fires once last ≥ stop.
    Rising,
    /// Fires once last ≤ stop.
    Falling,
}

impl TriggerDirection {
    /// `None` for types that are not stop-family.
    #[must_use]
    pub fn of(side: OrderSide, order_type: OrderType) -> Option<Self> {
        match (order_type, side) {
            (OrderType::StopLoss | OrderType::StopLimit, OrderSide::Buy)
            | (OrderType::TakeProfit, OrderSide::Sell) => Some(Self::Rising),
            (OrderType::StopLoss | OrderType::StopLimit, OrderSide::Sell)
            | (OrderType::TakeProfit, OrderSide::Buy) => Some(Self::Falling),
            _ => None,
        }
    }

    #[must_use]
    pub fn fires(self, stop: Decimal, last: Decimal) -> bool {
        match self {
            Self::Rising => last >= stop,
            Self::Falling => last <= stop,
        }
    }
}

/// Parked stop-family orders for one pair.
#[derive(Debug)]
pub struct StopBook {
    pub pair: MarketPair,
    rising: BTreeMap<Decimal, Vec<OrderId>>,
    falling: BTreeMap<Decimal, Vec<OrderId>>,
    orders: HashMap<OrderId, Order>,
}

impl StopBook {
    #[must_use]
    pub fn new(pair: MarketPair) -> Self {
        Self {
            pair,
            rising: BTreeMap::new(),
            falling: BTreeMap::new(),
            orders: HashMap::new(),
        }
    }

    /// Park a stop-family order until its trigger fires.
    pub fn park(&mut self, order: Order) -> Result<()> {
        if self.orders.contains_key(&order.id) {
            return Err(SpotmatchError::DuplicateOrder(order.id));
        }
        let direction = TriggerDirection::of(order.side, order.order_type).ok_or_else(|| {
            SpotmatchError::validation(format!("{} orders cannot be parked", order.order_type))
        })?;
        let stop = order
            .stop_price
            .ok_or_else(|| SpotmatchError::validation("stop order without stop price"))?;

        self.side_mut(direction).entry(stop).or_default().push(order.id);
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Unpark an order (cancel or expiry).
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order> {
        let order = self
            .orders
            .remove(order_id)
            .ok_or(SpotmatchError::OrderNotFound(*order_id))?;
        if let (Some(direction), Some(stop)) = (
            TriggerDirection::of(order.side, order.order_type),
            order.stop_price,
        ) {
            let bucket = self.side_mut(direction);
            if let Some(ids) = bucket.get_mut(&stop) {
                ids.retain(|id| id != order_id);
                if ids.is_empty() {
                    bucket.remove(&stop);
                }
            }
        }
        Ok(order)
    }

    /// Remove and return every order fired by `last`, in arrival order.
    pub fn take_triggered(&mut self, last: Decimal) -> Vec<Order> {
        let rising: Vec<Decimal> = self.rising.range(..=last).map(|(p, _)| *p).collect();
        let falling: Vec<Decimal> = self.falling.range(last..).map(|(p, _)| *p).collect();

        let mut fired: Vec<Order> = Vec::new();
        for stop in rising {
            for id in self.rising.remove(&stop).unwrap_or_default() {
                fired.extend(self.orders.remove(&id));
            }
        }
        for stop in falling {
            for id in self.falling.remove(&stop).unwrap_or_default() {
                fired.extend(self.orders.remove(&id));
            }
        }
        fired.sort_by_key(|o| o.sequence);
        if !fired.is_empty() {
            tracing::debug!(pair = %self.pair, %last, count = fired.len(), "stop orders triggered");
        }
        fired
    }

    /// Ids of parked orders whose expiry is at or before `now`, oldest first.
    #[must_use]
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<OrderId> {
        let mut expired: Vec<&Order> = self.orders.values().filter(|o| o.is_expired(now)).collect();
        expired.sort_by_key(|o| o.sequence);
        expired.into_iter().map(|o| o.id).collect()
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    #[must_use]
    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn orders_for(&self, owner: UserId) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(move |o| o.owner == owner)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn side_mut(&mut self, direction: TriggerDirection) -> &mut BTreeMap<Decimal, Vec<OrderId>> {
        match direction {
            TriggerDirection::Rising => &mut self.rising,
            TriggerDirection::Falling => &mut self.falling,
        }
    }
}
