//! Concurrent settlement against shared wallets.
//!
//! Many threads settle trades in both directions between the same users and
//! currencies. Lock ordering must prevent deadlock, and the ledger must end
//! up conserving supply with no negative components.

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use spotmatch_types::{TradeId, UserId};
use spotmatch_wallet::{BalanceReader, SettlementLeg, WalletLedger};

const THREADS: usize = 8;
const ROUNDS: usize = 500;

#[test]
fn crossing_settlements_do_not_deadlock_and_conserve_supply() {
    let ledger = Arc::new(WalletLedger::default());
    let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();
    for user in &users {
        ledger.deposit(*user, "BTC", Decimal::new(1_000, 0)).unwrap();
        ledger.deposit(*user, "USD", Decimal::new(1_000_000, 0)).unwrap();
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            let users = users.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                for _ in 0..ROUNDS {
                    let buyer = users[rng.gen_range(0..users.len())];
                    let seller = users[rng.gen_range(0..users.len())];
                    let qty = Decimal::new(rng.gen_range(1..10), 2);
                    let price = Decimal::new(rng.gen_range(90..110), 0);
                    let notional = qty * price;
                    let fee = (notional / Decimal::new(1000, 0)).round_dp(8);

                    if ledger.reserve(buyer, "USD", notional).is_err() {
                        continue;
                    }
                    if ledger.reserve(seller, "BTC", qty).is_err() {
                        ledger.release(buyer, "USD", notional).unwrap();
                        continue;
                    }
                    let legs = [
                        SettlementLeg::new(seller, buyer, "BTC", qty, Decimal::ZERO),
                        SettlementLeg::new(buyer, seller, "USD", notional, fee),
                    ];
                    ledger.settle_trade(TradeId::new(), &legs).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    ledger.verify_all_supply().unwrap();
    for (_, balance) in ledger.wallets() {
        assert!(balance.is_consistent());
        assert_eq!(balance.locked, Decimal::ZERO, "every reservation was settled or released");
    }
    let held: Decimal = users.iter().map(|u| ledger.get_balance(*u, "USD").total()).sum();
    assert_eq!(held + ledger.fees_collected("USD"), Decimal::new(4_000_000, 0));
}

#[test]
fn concurrent_reserves_never_overdraw() {
    let ledger = Arc::new(WalletLedger::default());
    let user = UserId::new();
    ledger.deposit(user, "USD", Decimal::new(100, 0)).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                (0..50)
                    .filter(|_| ledger.reserve(user, "USD", Decimal::ONE).is_ok())
                    .count()
            })
        })
        .collect();
    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(granted, 100);
    let balance = ledger.balance(user, "USD");
    assert_eq!(balance.available, Decimal::ZERO);
    assert_eq!(balance.locked, Decimal::new(100, 0));
}
