//! The wallet ledger: per-(user, currency) balances with available/locked
//! accounting.
//!
//! Every wallet sits behind its own mutex, so a user trading on two pairs
//! that share a quote currency serializes on that one wallet and nothing
//! else. Operations that touch several wallets lock them in [`WalletKey`]
//! order (currency code, then user), deduplicated, which rules out lock
//! cycles between concurrent settlements.
//!
//! All mutations are all-or-nothing: a failed call leaves every balance as
//! it was. The one exception is [`WalletLedger::release`], which clamps and
//! then reports the clamp.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spotmatch_types::{
    Currency, Result, SpotmatchError, TradeId, UserId, WalletBalance, WalletKey, constants,
};

use crate::guard::SettlementGuard;
use crate::supply::SupplyConservation;

type Slot = Arc<Mutex<WalletBalance>>;

/// One transfer of a trade: `amount` leaves the debited wallet's locked
/// balance and `amount - fee` lands in the credited wallet's available
/// balance. The fee goes to the ledger's fee pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLeg {
    pub debit_user: UserId,
    pub credit_user: UserId,
    pub currency: Currency,
    pub amount: Decimal,
    pub fee: Decimal,
}

impl SettlementLeg {
    #[must_use]
    pub fn new(
        debit_user: UserId,
        credit_user: UserId,
        currency: impl Into<Currency>,
        amount: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            debit_user,
            credit_user,
            currency: currency.into(),
            amount,
            fee,
        }
    }

    /// What the credited side actually receives.
    #[must_use]
    pub fn credited(&self) -> Decimal {
        self.amount - self.fee
    }

    fn debit_key(&self) -> WalletKey {
        WalletKey::new(self.debit_user, self.currency.clone())
    }

    fn credit_key(&self) -> WalletKey {
        WalletKey::new(self.credit_user, self.currency.clone())
    }
}

/// Single source of truth for balances.
#[derive(Debug)]
pub struct WalletLedger {
    wallets: RwLock<HashMap<WalletKey, Slot>>,
    /// Fees collected per currency.
    fees: Mutex<HashMap<Currency, Decimal>>,
    supply: Mutex<SupplyConservation>,
    settled: Mutex<SettlementGuard>,
}

impl WalletLedger {
    /// A ledger whose settlement guard remembers `guard_size` trade ids.
    #[must_use]
    pub fn new(guard_size: usize) -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            fees: Mutex::new(HashMap::new()),
            supply: Mutex::new(SupplyConservation::new()),
            settled: Mutex::new(SettlementGuard::new(guard_size)),
        }
    }

    /// The wallet for `key`, created on first reference.
    fn slot(&self, key: &WalletKey) -> Slot {
        if let Some(slot) = self.wallets.read().get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.wallets.write().entry(key.clone()).or_default())
    }

    // =================================================================
    // Funding
    // =================================================================

    /// Credit `available` from outside the system.
    pub fn deposit(&self, user: UserId, currency: &str, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(SpotmatchError::InvalidAmount(amount));
        }
        let slot = self.slot(&WalletKey::new(user, currency));
        let mut entry = slot.lock();
        entry.available += amount;
        self.supply.lock().record_deposit(currency, amount);
        tracing::debug!(%user, currency, %amount, "deposit");
        Ok(())
    }

    /// Debit `available` to outside the system. Locked funds stay put.
    pub fn withdraw(&self, user: UserId, currency: &str, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(SpotmatchError::InvalidAmount(amount));
        }
        let slot = self.slot(&WalletKey::new(user, currency));
        let mut entry = slot.lock();
        if entry.available < amount {
            return Err(SpotmatchError::InsufficientBalance {
                needed: amount,
                available: entry.available,
            });
        }
        entry.available -= amount;
        self.supply.lock().record_withdrawal(currency, amount);
        tracing::debug!(%user, currency, %amount, "withdraw");
        Ok(())
    }

    // =================================================================
    // Reserve / release
    // =================================================================

    /// Move `amount` from available to locked, or fail untouched.
    pub fn reserve(&self, user: UserId, currency: &str, amount: Decimal) -> Result<()> {
        if amount < Decimal::ZERO {
            return Err(SpotmatchError::InvalidAmount(amount));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let slot = self.slot(&WalletKey::new(user, currency));
        let mut entry = slot.lock();
        if entry.available < amount {
            return Err(SpotmatchError::InsufficientBalance {
                needed: amount,
                available: entry.available,
            });
        }
        entry.available -= amount;
        entry.locked += amount;
        tracing::trace!(%user, currency, %amount, "reserved");
        Ok(())
    }

    /// Move up to `amount` from locked back to available.
    ///
    /// Returns the amount released. If less than `amount` was locked, what
    /// was there is released and the shortfall comes back as
    /// [`SpotmatchError::LockedUnderflow`].
    pub fn release(&self, user: UserId, currency: &str, amount: Decimal) -> Result<Decimal> {
        if amount < Decimal::ZERO {
            return Err(SpotmatchError::InvalidAmount(amount));
        }
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let slot = self.slot(&WalletKey::new(user, currency));
        let mut entry = slot.lock();
        let released = amount.min(entry.locked);
        entry.locked -= released;
        entry.available += released;

        if released < amount {
            tracing::warn!(%user, currency, requested = %amount, %released, "release clamped at locked balance");
            return Err(SpotmatchError::LockedUnderflow {
                requested: amount,
                released,
            });
        }
        tracing::trace!(%user, currency, %amount, "released");
        Ok(released)
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle a single transfer.
    pub fn settle(
        &self,
        debit_user: UserId,
        credit_user: UserId,
        currency: &str,
        amount: Decimal,
        fee: Decimal,
    ) -> Result<()> {
        self.apply_legs(&[SettlementLeg::new(debit_user, credit_user, currency, amount, fee)])
    }

    /// Settle every leg of one trade atomically, at most once per trade id.
    ///
    /// # Errors
    /// - `TradeAlreadySettled` if `trade_id` was settled before
    /// - `SettlementInconsistency` if any debited wallet lacks the locked
    ///   funds, or a fee is negative or larger than its leg; nothing is
    ///   applied in that case
    pub fn settle_trade(&self, trade_id: TradeId, legs: &[SettlementLeg]) -> Result<()> {
        self.settled.lock().mark_settled(trade_id)?;
        if let Err(err) = self.apply_legs(legs) {
            self.settled.lock().forget(&trade_id);
            tracing::error!(%trade_id, error = %err, "trade settlement rejected");
            return Err(err);
        }
        Ok(())
    }

    fn apply_legs(&self, legs: &[SettlementLeg]) -> Result<()> {
        for leg in legs {
            if leg.amount < Decimal::ZERO || leg.fee < Decimal::ZERO || leg.fee > leg.amount {
                return Err(SpotmatchError::SettlementInconsistency {
                    reason: format!(
                        "{} leg with amount {} and fee {}",
                        leg.currency, leg.amount, leg.fee
                    ),
                });
            }
        }

        // Resolve every wallet first, then lock in key order.
        let handles: BTreeMap<WalletKey, Slot> = legs
            .iter()
            .flat_map(|leg| [leg.debit_key(), leg.credit_key()])
            .map(|key| {
                let slot = self.slot(&key);
                (key, slot)
            })
            .collect();
        let mut guards: BTreeMap<&WalletKey, MutexGuard<'_, WalletBalance>> =
            handles.iter().map(|(key, slot)| (key, slot.lock())).collect();

        let mut debits: BTreeMap<WalletKey, Decimal> = BTreeMap::new();
        for leg in legs {
            *debits.entry(leg.debit_key()).or_default() += leg.amount;
        }
        for (key, needed) in &debits {
            let locked = guards.get(key).map_or(Decimal::ZERO, |entry| entry.locked);
            if locked < *needed {
                return Err(SpotmatchError::SettlementInconsistency {
                    reason: format!("{key} has {locked} locked, settlement needs {needed}"),
                });
            }
        }

        for leg in legs {
            if let Some(debit) = guards.get_mut(&leg.debit_key()) {
                debit.locked -= leg.amount;
            }
            if let Some(credit) = guards.get_mut(&leg.credit_key()) {
                credit.available += leg.credited();
            }
        }
        let mut fees = self.fees.lock();
        for leg in legs.iter().filter(|leg| leg.fee > Decimal::ZERO) {
            *fees.entry(leg.currency.clone()).or_default() += leg.fee;
        }
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Current balance; zero for a wallet never referenced.
    #[must_use]
    pub fn balance(&self, user: UserId, currency: &str) -> WalletBalance {
        let key = WalletKey::new(user, currency);
        let slot = self.wallets.read().get(&key).map(Arc::clone);
        slot.map(|slot| slot.lock().clone()).unwrap_or_default()
    }

    /// Fees collected in `currency` so far.
    #[must_use]
    pub fn fees_collected(&self, currency: &str) -> Decimal {
        self.fees.lock().get(currency).copied().unwrap_or_default()
    }

    /// Σ(available + locked) over every wallet in `currency`.
    #[must_use]
    pub fn total_supply(&self, currency: &str) -> Decimal {
        self.wallets
            .read()
            .iter()
            .filter(|(key, _)| key.currency == currency)
            .map(|(_, slot)| slot.lock().total())
            .sum()
    }

    /// Every wallet, sorted by key.
    #[must_use]
    pub fn wallets(&self) -> Vec<(WalletKey, WalletBalance)> {
        let mut all: Vec<(WalletKey, WalletBalance)> = self
            .wallets
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.lock().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Check supply conservation for one currency.
    pub fn verify_supply(&self, currency: &str) -> Result<()> {
        let held = self.total_supply(currency);
        let fees = self.fees_collected(currency);
        self.supply.lock().verify(currency, held, fees)
    }

    /// Check supply conservation for every currency the ledger has funded.
    pub fn verify_all_supply(&self) -> Result<()> {
        let currencies = self.supply.lock().tracked_currencies();
        for currency in currencies {
            self.verify_supply(&currency)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_settled(&self, trade_id: &TradeId) -> bool {
        self.settled.lock().is_settled(trade_id)
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new(constants::DEFAULT_SETTLEMENT_GUARD_SIZE)
    }
}

/// Fault injection.
#[cfg(any(test, feature = "test-helpers"))]
impl WalletLedger {
    /// Overwrite a wallet without touching supply bookkeeping.
    pub fn force_balance(&self, user: UserId, currency: &str, balance: WalletBalance) {
        let slot = self.slot(&WalletKey::new(user, currency));
        *slot.lock() = balance;
    }
}
