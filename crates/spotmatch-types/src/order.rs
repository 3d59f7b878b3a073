//! Order types for the SpotMatch matching core.
//!
//! An [`Order`] is created from an [`OrderRequest`] in `PENDING` state. The
//! engine owns every live order; once an order is terminal it can be handed
//! to a persistence collaborator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, MarketPair, OrderId, OrderStatus, Result, SpotmatchError, UserId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLimit,
    TakeProfit,
}

impl OrderType {
    /// Types that must carry a limit price.
    #[must_use]
    pub fn requires_price(self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }

    /// Types that wait for a stop trigger before entering the book.
    #[must_use]
    pub fn is_stop_family(self) -> bool {
        matches!(self, Self::StopLoss | Self::StopLimit | Self::TakeProfit)
    }

    /// The type a triggered stop order is resubmitted as.
    ///
    /// Take-profit orders become limit orders when they carry a price and
    /// market orders otherwise.
    #[must_use]
    pub fn underlying(self, has_price: bool) -> Self {
        match self {
            Self::StopLoss => Self::Market,
            Self::StopLimit => Self::Limit,
            Self::TakeProfit if has_price => Self::Limit,
            Self::TakeProfit => Self::Market,
            other => other,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

/// How long an order may stay working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    Gtc,
    /// Immediate-or-cancel: unfilled remainder is cancelled after matching.
    Ioc,
    /// Fill-or-kill: fully filled at once or rejected untouched.
    Fok,
    /// Expires at the end of the trading day.
    Day,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
            Self::Day => write!(f, "DAY"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderRequest
// ---------------------------------------------------------------------------

/// What a client asks the engine to do. Validated by the engine before an
/// [`Order`] is built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub owner: UserId,
    pub pair: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OrderRequest {
    #[must_use]
    pub fn limit(
        owner: UserId,
        pair: MarketPair,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            owner,
            pair,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn market(owner: UserId, pair: MarketPair, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            owner,
            pair,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            expires_at: None,
        }
    }

    /// A stop-family request. `price` is only meaningful for stop-limit and
    /// take-profit-limit.
    #[must_use]
    pub fn stop(
        owner: UserId,
        pair: MarketPair,
        side: OrderSide,
        order_type: OrderType,
        quantity: Decimal,
        stop_price: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            owner,
            pair,
            side,
            order_type,
            quantity,
            price,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::Gtc,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn with_tif(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A live or historical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: UserId,
    pub pair: MarketPair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    /// Client limit price.
    pub price: Option<Decimal>,
    /// Stop trigger price.
    pub stop_price: Option<Decimal>,
    /// Engine-assigned price collar for market orders; their book price.
    pub protection_price: Option<Decimal>,
    pub quantity: Decimal,
    pub remaining_qty: Decimal,
    pub filled_qty: Decimal,
    /// Volume-weighted average fill price (zero until the first fill).
    pub avg_fill_price: Decimal,
    /// Funds still reserved in the ledger for this order.
    pub locked_amount: Decimal,
    /// Original stop-family type, set when a stop order is converted.
    pub triggered_from: Option<OrderType>,
    /// Per-pair arrival sequence.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a `PENDING` order from a request.
    #[must_use]
    pub fn from_request(request: &OrderRequest, sequence: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            owner: request.owner,
            pair: request.pair.clone(),
            side: request.side,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            price: request.price,
            stop_price: request.stop_price,
            protection_price: None,
            quantity: request.quantity,
            remaining_qty: request.quantity,
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            locked_amount: Decimal::ZERO,
            triggered_from: None,
            sequence,
            created_at: now,
            updated_at: now,
            expires_at: request.expires_at,
        }
    }

    /// The price this order rests at: its limit, or the engine's collar.
    #[must_use]
    pub fn working_price(&self) -> Option<Decimal> {
        match self.order_type {
            OrderType::Market => self.protection_price,
            _ => self.price.or(self.protection_price),
        }
    }

    /// Would this order accept a fill at `price`?
    #[must_use]
    pub fn accepts_price(&self, price: Decimal) -> bool {
        match (self.side, self.working_price()) {
            (OrderSide::Buy, Some(limit)) => price <= limit,
            (OrderSide::Sell, Some(limit)) => price >= limit,
            (_, None) => false,
        }
    }

    /// Currency reserved to fund this order: quote for buys, base for sells.
    #[must_use]
    pub fn funding_currency(&self) -> &Currency {
        match self.side {
            OrderSide::Buy => &self.pair.quote,
            OrderSide::Sell => &self.pair.base,
        }
    }

    /// Currency this order receives when it trades.
    #[must_use]
    pub fn receiving_currency(&self) -> &Currency {
        match self.side {
            OrderSide::Buy => &self.pair.base,
            OrderSide::Sell => &self.pair.quote,
        }
    }

    /// Record a fill of `qty` at `price`, updating the VWAP and the status.
    ///
    /// # Errors
    /// `Internal` when `qty` exceeds the remaining quantity or is not
    /// positive; `InvalidTransition` when the order cannot trade.
    pub fn apply_fill(&mut self, qty: Decimal, price: Decimal) -> Result<()> {
        if qty <= Decimal::ZERO || qty > self.remaining_qty {
            return Err(SpotmatchError::Internal(format!(
                "fill of {qty} on order {} with remaining {}",
                self.id, self.remaining_qty
            )));
        }
        let new_filled = self.filled_qty + qty;
        let next = if self.remaining_qty == qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next)?;
        self.avg_fill_price = (self.avg_fill_price * self.filled_qty + price * qty) / new_filled;
        self.filled_qty = new_filled;
        self.remaining_qty -= qty;
        Ok(())
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining_qty.is_zero()
    }

    #[must_use]
    pub fn fill_ratio(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.filled_qty / self.quantity
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_limit_for_user(UserId::new(), side, price, qty)
    }

    pub fn dummy_limit_for_user(
        owner: UserId,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        let request = OrderRequest::limit(owner, MarketPair::new("BTC", "USD"), side, qty, price);
        let mut order = Self::from_request(&request, 0, Utc::now());
        order.status = OrderStatus::Open;
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_display_and_opposite() {
        assert_eq!(format!("{}", OrderSide::Buy), "BUY");
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }

    #[test]
    fn stop_conversion_targets() {
        assert_eq!(OrderType::StopLoss.underlying(false), OrderType::Market);
        assert_eq!(OrderType::StopLimit.underlying(true), OrderType::Limit);
        assert_eq!(OrderType::TakeProfit.underlying(true), OrderType::Limit);
        assert_eq!(OrderType::TakeProfit.underlying(false), OrderType::Market);
        assert_eq!(OrderType::Limit.underlying(true), OrderType::Limit);
    }

    #[test]
    fn fills_keep_quantity_invariant_and_vwap() {
        let mut order = Order::dummy_limit(OrderSide::Buy, Decimal::new(110, 0), Decimal::new(3, 0));
        order.apply_fill(Decimal::ONE, Decimal::new(100, 0)).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        order.apply_fill(Decimal::TWO, Decimal::new(106, 0)).unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_qty + order.remaining_qty, order.quantity);
        // (100*1 + 106*2) / 3 = 104
        assert_eq!(order.avg_fill_price, Decimal::new(104, 0));
        assert_eq!(order.fill_ratio(), Decimal::ONE);
    }

    #[test]
    fn overfill_is_rejected_without_mutation() {
        let mut order = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), Decimal::ONE);
        let err = order.apply_fill(Decimal::TWO, Decimal::new(100, 0)).unwrap_err();
        assert!(matches!(err, SpotmatchError::Internal(_)));
        assert_eq!(order.remaining_qty, Decimal::ONE);
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn working_price_prefers_limit() {
        let mut order = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE);
        assert_eq!(order.working_price(), Some(Decimal::new(100, 0)));
        order.order_type = OrderType::Market;
        order.price = None;
        assert_eq!(order.working_price(), None);
        order.protection_price = Some(Decimal::new(105, 0));
        assert!(order.accepts_price(Decimal::new(105, 0)));
        assert!(!order.accepts_price(Decimal::new(106, 0)));
    }

    #[test]
    fn funding_currencies() {
        let buy = Order::dummy_limit(OrderSide::Buy, Decimal::new(100, 0), Decimal::ONE);
        let sell = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), Decimal::ONE);
        assert_eq!(buy.funding_currency(), "USD");
        assert_eq!(buy.receiving_currency(), "BTC");
        assert_eq!(sell.funding_currency(), "BTC");
    }

    #[test]
    fn request_serde_defaults_tif() {
        let json = r#"{
            "owner": "0190f0a2-7c1e-7000-8000-000000000001",
            "pair": {"base": "BTC", "quote": "USD"},
            "side": "BUY",
            "order_type": "LIMIT",
            "quantity": "1.5",
            "price": "100",
            "stop_price": null
        }"#;
        let req: OrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.time_in_force, TimeInForce::Gtc);
        assert_eq!(req.quantity, Decimal::new(15, 1));
    }
}
