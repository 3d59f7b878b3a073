//! Aggregated depth views of an order book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spotmatch_types::MarketPair;

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub price: Decimal,
    /// Sum of remaining quantity at this price.
    pub quantity: Decimal,
    pub order_count: usize,
}

/// Depth view of both sides, best level first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub pair: MarketPair,
    pub bids: Vec<LevelSnapshot>,
    pub asks: Vec<LevelSnapshot>,
    pub taken_at: DateTime<Utc>,
}

impl BookSnapshot {
    #[must_use]
    pub fn best_bid(&self) -> Option<&LevelSnapshot> {
        self.bids.first()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<&LevelSnapshot> {
        self.asks.first()
    }

    /// `(price, aggregate_qty)` pairs for the bid side.
    #[must_use]
    pub fn bid_pairs(&self) -> Vec<(Decimal, Decimal)> {
        self.bids.iter().map(|l| (l.price, l.quantity)).collect()
    }

    /// `(price, aggregate_qty)` pairs for the ask side.
    #[must_use]
    pub fn ask_pairs(&self) -> Vec<(Decimal, Decimal)> {
        self.asks.iter().map(|l| (l.price, l.quantity)).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
