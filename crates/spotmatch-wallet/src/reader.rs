//! Read-side balance boundary.

use spotmatch_types::{UserId, WalletBalance};

use crate::ledger::WalletLedger;

/// Balance lookups for reporting. Reserve and settle stay on the ledger.
pub trait BalanceReader: Send + Sync {
    fn get_balance(&self, user: UserId, currency: &str) -> WalletBalance;
}

impl BalanceReader for WalletLedger {
    fn get_balance(&self, user: UserId, currency: &str) -> WalletBalance {
        self.balance(user, currency)
    }
}
