//! # spotmatch-book
//!
//! **Per-pair order storage for SpotMatch.**
//!
//! - [`OrderBook`]: priced bid/ask queues in price-time priority, backed by
//!   an order arena so fills happen in place
//! - [`StopBook`]: watch list of stop-family orders waiting for a trigger
//! - [`BookSnapshot`]: aggregated depth for read-side consumers
//!
//! Nothing here touches balances or publishes events; the engine owns both.

pub mod orderbook;
pub mod price_level;
pub mod snapshot;
pub mod stop_book;

pub use orderbook::{Crossing, MatchablePairs, OrderBook};
pub use price_level::PriceLevel;
pub use snapshot::{BookSnapshot, LevelSnapshot};
pub use stop_book::{StopBook, TriggerDirection};
