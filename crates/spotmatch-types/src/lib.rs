//! # spotmatch-types
//!
//! Shared types, errors, and configuration for the **SpotMatch** matching core.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`UserId`], [`TradeId`], [`MarketPair`], [`Currency`]
//! - **Order model**: [`Order`], [`OrderRequest`], [`OrderSide`], [`OrderType`], [`TimeInForce`]
//! - **Lifecycle**: [`OrderStatus`] and the transition table behind [`Order::transition`]
//! - **Trade model**: [`Trade`]
//! - **Balance model**: [`WalletBalance`], [`WalletKey`]
//! - **Events**: [`EngineEvent`], [`TradeEvent`], [`OrderUpdate`], [`Alert`]
//! - **Configuration**: [`EngineConfig`], [`PairConfig`], [`FeeSchedule`]
//! - **Errors**: [`SpotmatchError`] with `SM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod lifecycle;
pub mod order;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use spotmatch_types::{Order, OrderSide, Trade, WalletBalance, ...};

pub use balance::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use lifecycle::*;
pub use order::*;
pub use trade::*;

// Constants are accessed via `spotmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
