//! # spotmatch-engine
//!
//! Continuous price-time matching for spot pairs.
//!
//! ## Architecture
//!
//! ```text
//! submit_order ─▶ validation ─▶ PairState (pair lock)
//!                                 ├─ OrderBook / StopBook
//!                                 ├─ WalletLedger::settle_trade per match
//!                                 └─ events ─▶ EventSink (broadcast, queue, tracing, callback)
//! ```
//!
//! [`MatchingEngine`] is the entry point. Fees live in [`fees`], request
//! checks in [`validation`], and [`spawn_expiry_sweeper`] drives DAY and
//! dated expiry from a tokio interval.

mod archive;
pub mod engine;
pub mod fees;
mod matcher;
pub mod outcome;
pub mod sink;
pub mod sweeper;
pub mod validation;

pub use engine::MatchingEngine;
pub use fees::{FeeCharge, charge_for, taker_fee};
pub use outcome::{CancelResult, OrderResult};
pub use sink::{BoundedQueueSink, BroadcastSink, EventSink, TracingSink, TradeCallbackSink};
pub use sweeper::spawn_expiry_sweeper;
