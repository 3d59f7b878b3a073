//! # spotmatch-wallet
//!
//! **Balance ledger for SpotMatch.**
//!
//! Funds move through a two-phase protocol:
//! 1. **Reserve**: available → locked when an order is accepted
//! 2. **Settle**: locked leaves the payer, available (minus fee) reaches the
//!    payee, once per trade
//!
//! Unused reservations go back through **release**. Around that core:
//! - [`SettlementGuard`]: a trade id settles at most once
//! - [`SupplyConservation`]: wallets plus fees always equal net deposits
//! - [`BalanceReader`]: read-only view for reporting collaborators

pub mod guard;
pub mod ledger;
pub mod reader;
pub mod supply;

pub use guard::SettlementGuard;
pub use ledger::{SettlementLeg, WalletLedger};
pub use reader::BalanceReader;
pub use supply::SupplyConservation;
