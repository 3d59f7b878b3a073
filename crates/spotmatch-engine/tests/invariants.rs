//! Integration test: engine-wide invariants under random and concurrent flow
//!
//! A seeded random order stream (limit, market, IOC, FOK, cancels) is run
//! against one pair, and several threads trade two pairs that share a quote
//! currency. After every step and at the end:
//!
//! - every order: `filled + remaining == quantity`
//! - every wallet: `available, locked >= 0`
//! - supply per currency is conserved (fees included)
//! - the book is never left crossed
//! - once everything is cancelled, nothing stays locked

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use spotmatch_engine::MatchingEngine;
use spotmatch_types::*;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn funded_users(engine: &MatchingEngine, count: usize) -> Vec<UserId> {
    (0..count)
        .map(|_| {
            let user = UserId::new();
            engine.ledger().deposit(user, "BTC", dec(50)).unwrap();
            engine.ledger().deposit(user, "ETH", dec(500)).unwrap();
            engine.ledger().deposit(user, "USD", dec(100_000)).unwrap();
            user
        })
        .collect()
}

fn random_request(rng: &mut StdRng, owner: UserId, pair: &MarketPair) -> OrderRequest {
    let side = if rng.gen_bool(0.5) {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };
    let qty = Decimal::new(rng.gen_range(1..=300), 2);
    let price = dec(rng.gen_range(95..=105));
    let request = match rng.gen_range(0..10) {
        0 => OrderRequest::market(owner, pair.clone(), side, qty),
        _ => OrderRequest::limit(owner, pair.clone(), side, qty, price),
    };
    match rng.gen_range(0..10) {
        0 => request.with_tif(TimeInForce::Ioc),
        1 => request.with_tif(TimeInForce::Fok),
        _ => request,
    }
}

fn assert_book_uncrossed(engine: &MatchingEngine, pair: &MarketPair) {
    let book = engine.get_order_book_snapshot(pair, 1).unwrap();
    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        assert!(bid.price < ask.price, "{pair} crossed: {} >= {}", bid.price, ask.price);
    }
}

fn assert_wallets_sound(engine: &MatchingEngine) {
    for (key, balance) in engine.ledger().wallets() {
        assert!(balance.is_consistent(), "{key}: {balance:?}");
    }
    engine.ledger().verify_all_supply().unwrap();
}

fn cancel_everything(engine: &MatchingEngine, users: &[UserId]) {
    for user in users {
        for order in engine.open_orders(*user, None) {
            engine.cancel_order(order.id, *user).unwrap();
        }
    }
}

#[test]
fn seeded_random_flow_keeps_invariants() {
    let engine = MatchingEngine::new(EngineConfig::default()).unwrap();
    let pair = MarketPair::new("BTC", "USD");
    let users = funded_users(&engine, 6);
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut placed: Vec<(OrderId, UserId)> = Vec::new();

    for _ in 0..2_000 {
        let owner = users[rng.gen_range(0..users.len())];

        if !placed.is_empty() && rng.gen_range(0..5) == 0 {
            let (order_id, owner) = placed[rng.gen_range(0..placed.len())];
            match engine.cancel_order(order_id, owner) {
                Ok(result) => assert!(result.released >= Decimal::ZERO),
                Err(SpotmatchError::NotCancellable { status }) => assert!(status.is_terminal()),
                Err(other) => panic!("unexpected cancel error: {other}"),
            }
        } else {
            match engine.submit_order(random_request(&mut rng, owner, &pair)) {
                Ok(result) => {
                    assert_eq!(
                        result.filled_quantity + result.remaining_quantity,
                        engine.order(&result.order_id).unwrap().quantity
                    );
                    if result.status == OrderStatus::Rejected {
                        assert!(result.trades.is_empty(), "FOK rejection must not trade");
                    }
                    for trade in &result.trades {
                        assert!(trade.fee >= Decimal::ZERO);
                        assert_eq!(trade.quote_amount, trade.price * trade.quantity);
                    }
                    placed.push((result.order_id, owner));
                }
                Err(
                    SpotmatchError::InsufficientBalance { .. }
                    | SpotmatchError::ValidationError { .. },
                ) => {}
                Err(other) => panic!("unexpected submit error: {other}"),
            }
        }

        assert_book_uncrossed(&engine, &pair);
        assert_wallets_sound(&engine);
    }

    for (order_id, _) in &placed {
        let order = engine.order(order_id).unwrap();
        assert_eq!(order.filled_qty + order.remaining_qty, order.quantity);
        if matches!(order.time_in_force, TimeInForce::Ioc | TimeInForce::Fok) {
            assert!(order.status.is_terminal(), "immediate order left resting");
        }
    }

    cancel_everything(&engine, &users);
    for (key, balance) in engine.ledger().wallets() {
        assert_eq!(balance.locked, Decimal::ZERO, "{key} still has funds locked");
    }
    assert_wallets_sound(&engine);
    assert!(engine.get_order_book_snapshot(&pair, 10).unwrap().is_empty());
}

#[test]
fn concurrent_pairs_share_quote_wallets_safely() {
    let engine = Arc::new(MatchingEngine::new(EngineConfig::default()).unwrap());
    let users = funded_users(&engine, 4);
    let pairs = [MarketPair::new("BTC", "USD"), MarketPair::new("ETH", "USD")];

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let users = users.clone();
            let pair = pairs[(t % 2) as usize].clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                let mut trades = 0usize;
                for _ in 0..300 {
                    let owner = users[rng.gen_range(0..users.len())];
                    if let Ok(result) = engine.submit_order(random_request(&mut rng, owner, &pair)) {
                        trades += result.trades.len();
                    }
                }
                trades
            })
        })
        .collect();

    let traded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(traded > 0, "random flow should produce trades");

    for pair in &pairs {
        assert_book_uncrossed(&engine, pair);
    }
    assert_wallets_sound(&engine);

    cancel_everything(&engine, &users);
    for (key, balance) in engine.ledger().wallets() {
        assert_eq!(balance.locked, Decimal::ZERO, "{key} still has funds locked");
    }
    engine.ledger().verify_all_supply().unwrap();
}

#[test]
fn fees_account_for_every_gross_amount() {
    let engine = MatchingEngine::new(EngineConfig::default()).unwrap();
    let pair = MarketPair::new("BTC", "USD");
    let users = funded_users(&engine, 3);
    let mut rng = StdRng::seed_from_u64(7);

    let mut fees_by_currency: std::collections::HashMap<String, Decimal> =
        std::collections::HashMap::new();
    for _ in 0..500 {
        let owner = users[rng.gen_range(0..users.len())];
        if let Ok(result) = engine.submit_order(random_request(&mut rng, owner, &pair)) {
            for trade in result.trades {
                *fees_by_currency.entry(trade.fee_currency.clone()).or_default() += trade.fee;
            }
        }
    }

    // Each trade reports its fee in exactly one submission result (the
    // taker's), so the totals must match the ledger's fee pool.
    for currency in ["BTC", "USD"] {
        assert_eq!(
            engine.ledger().fees_collected(currency),
            fees_by_currency.get(currency).copied().unwrap_or_default(),
            "{currency} fee pool"
        );
    }
}
