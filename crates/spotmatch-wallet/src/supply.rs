//! Supply conservation.
//!
//! Settlement only moves value between wallets and the fee pool, so for every
//! currency:
//! ```text
//! Σ(available + locked) + fees == Σ(deposits) - Σ(withdrawals)
//! ```
//! A mismatch means the ledger lost or minted value.

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use spotmatch_types::{Currency, Result, SpotmatchError};

/// Per-currency deposit and withdrawal totals.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    deposits: HashMap<Currency, Decimal>,
    withdrawals: HashMap<Currency, Decimal>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, currency: &str, amount: Decimal) {
        *self.deposits.entry(currency.to_string()).or_default() += amount;
    }

    pub fn record_withdrawal(&mut self, currency: &str, amount: Decimal) {
        *self.withdrawals.entry(currency.to_string()).or_default() += amount;
    }

    #[must_use]
    pub fn total_deposits(&self, currency: &str) -> Decimal {
        self.deposits.get(currency).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_withdrawals(&self, currency: &str) -> Decimal {
        self.withdrawals.get(currency).copied().unwrap_or_default()
    }

    /// Deposits minus withdrawals.
    #[must_use]
    pub fn expected_supply(&self, currency: &str) -> Decimal {
        self.total_deposits(currency) - self.total_withdrawals(currency)
    }

    /// Check wallet holdings plus collected fees against the expected supply.
    pub fn verify(&self, currency: &str, held: Decimal, fees: Decimal) -> Result<()> {
        let expected = self.expected_supply(currency);
        if held + fees != expected {
            return Err(SpotmatchError::SupplyInvariantViolation {
                reason: format!(
                    "{currency}: wallets {held} + fees {fees} != expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(currency),
                    self.total_withdrawals(currency),
                ),
            });
        }
        Ok(())
    }

    /// Every currency that has seen a deposit or withdrawal, sorted.
    #[must_use]
    pub fn tracked_currencies(&self) -> Vec<Currency> {
        let set: BTreeSet<&Currency> = self.deposits.keys().chain(self.withdrawals.keys()).collect();
        set.into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_supply_is_zero() {
        let sc = SupplyConservation::new();
        assert_eq!(sc.expected_supply("BTC"), Decimal::ZERO);
        assert!(sc.verify("BTC", Decimal::ZERO, Decimal::ZERO).is_ok());
    }

    #[test]
    fn withdrawals_decrease_expected() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit("USD", Decimal::new(1000, 0));
        sc.record_withdrawal("USD", Decimal::new(300, 0));
        assert_eq!(sc.expected_supply("USD"), Decimal::new(700, 0));
    }

    #[test]
    fn fees_count_toward_supply() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit("USD", Decimal::new(100, 0));
        assert!(sc.verify("USD", Decimal::new(99, 0), Decimal::ONE).is_ok());
        let err = sc.verify("USD", Decimal::new(99, 0), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, SpotmatchError::SupplyInvariantViolation { .. }));
    }

    #[test]
    fn tracked_currencies_sorted_and_deduped() {
        let mut sc = SupplyConservation::new();
        sc.record_deposit("USD", Decimal::ONE);
        sc.record_deposit("BTC", Decimal::ONE);
        sc.record_withdrawal("USD", Decimal::ONE);
        assert_eq!(sc.tracked_currencies(), vec!["BTC".to_string(), "USD".to_string()]);
    }
}
