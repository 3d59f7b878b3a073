//! Identifiers used throughout SpotMatch.
//!
//! Entity IDs use UUIDv7 so they sort by creation time. Trade IDs are
//! derived from the pair symbol and the pair's trade sequence, which makes
//! them stable across replays of the same order flow.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currency code (e.g., "BTC", "USD").
pub type Currency = String;

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Globally unique order identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Unique identifier for a user / trading account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MarketPair
// ---------------------------------------------------------------------------

/// A trading pair (e.g., BTC/USD). `base` is traded, `quote` prices it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MarketPair {
    pub base: Currency,
    pub quote: Currency,
}

impl MarketPair {
    #[must_use]
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// ---------------------------------------------------------------------------
// TradeId
// ---------------------------------------------------------------------------

/// Globally unique trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Derive a `TradeId` from the pair and the pair's trade sequence.
    ///
    /// The same pair and sequence always yield the same id, so a settlement
    /// replay of one match is recognisable as a duplicate.
    #[must_use]
    pub fn deterministic(pair: &MarketPair, sequence: u64) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"spotmatch:trade_id:v1:");
        hasher.update(pair.base.as_bytes());
        hasher.update(b"/");
        hasher.update(pair.quote.as_bytes());
        hasher.update(sequence.to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
